//! Live feed bridge — producer thread to runner via message passing.
//!
//! Instead of locking a shared timeline, the producer sends events over an
//! `mpsc` channel and the consumer merges them into its own timeline before
//! each pop. The producer signals termination by sending a Stop event; a
//! channel that disconnects without one is an abnormal end.

use crate::data::PriceTick;
use crate::events::Event;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

/// Consumer side of a live event stream.
pub struct LiveFeed {
    rx: Receiver<Event>,
}

impl LiveFeed {
    /// Raw channel for tests and custom producers.
    pub fn channel() -> (Sender<Event>, LiveFeed) {
        let (tx, rx) = mpsc::channel();
        (tx, LiveFeed { rx })
    }

    /// Spawn a producer thread that converts ticks into Market events and
    /// ends the stream with a Stop at the last tick's timestamp.
    pub fn spawn(ticks: Box<dyn Iterator<Item = PriceTick> + Send>) -> (LiveFeed, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let mut last_seen = None;
            for tick in ticks {
                last_seen = Some(tick.timestamp);
                let event = Event::Market {
                    timestamp: tick.timestamp,
                    symbols: vec![tick.symbol.clone()],
                    prices: HashMap::from([(tick.symbol, tick.price)]),
                };
                if tx.send(event).is_err() {
                    return; // consumer gone, stop producing
                }
            }
            let _ = tx.send(Event::Stop {
                timestamp: last_seen.unwrap_or_else(Utc::now),
                reason: "feed ended".into(),
            });
        });
        (LiveFeed { rx }, handle)
    }

    /// Non-blocking poll; `None` when nothing is pending or the producer hung up.
    pub fn try_recv(&self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocking receive; `None` once the producer has disconnected.
    pub fn recv(&self) -> Option<Event> {
        self.rx.recv().ok()
    }
}
