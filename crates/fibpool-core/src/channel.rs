//! Work and Result Channel endpoints.
//!
//! The engine only ever talks to a channel through two operations:
//!
//! - [`Inbox::pop`] blocks until an item is available and removes exactly
//!   one. Concurrent callers never receive the same item.
//! - [`Outbox::push`] never blocks on an unbounded channel and never drops an
//!   item.
//!
//! FIFO order holds per producer; items from different producers interleave.
//! The in-memory implementation is an unbounded `crossbeam_channel`; the
//! pipe-based one lives in [`crate::wire`].

use crate::{Error, Result};
use crossbeam_channel::{Receiver, Sender};

/// Receiving end of a channel.
pub trait Inbox<T> {
    /// Removes and returns the next item, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] once no item can ever arrive.
    fn pop(&mut self) -> Result<T>;
}

/// Sending end of a channel.
pub trait Outbox<T> {
    /// Enqueues `item`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if nobody can receive it anymore.
    fn push(&mut self, item: T) -> Result<()>;
}

/// Creates an unbounded multi-producer multi-consumer channel.
pub fn unbounded<T>() -> (Sender<T>, Receiver<T>) {
    crossbeam_channel::unbounded()
}

impl<T> Inbox<T> for Receiver<T> {
    fn pop(&mut self) -> Result<T> {
        self.recv()
            .map_err(|_| Error::closed("all senders disconnected"))
    }
}

impl<T> Outbox<T> for Sender<T> {
    fn push(&mut self, item: T) -> Result<()> {
        self.send(item)
            .map_err(|_| Error::closed("all receivers disconnected"))
    }
}

/// One inbox and one outbox, held together.
///
/// Lets a worker loop borrow both of its endpoints through a single `&mut`,
/// which matters when both directions share one underlying resource (see
/// [`crate::wire::PullLink`]).
#[derive(Debug)]
pub struct Link<I, O> {
    pub inbox: I,
    pub outbox: O,
}

impl<I, O> Link<I, O> {
    pub const fn new(inbox: I, outbox: O) -> Self {
        Self { inbox, outbox }
    }
}

impl<T, I: Inbox<T>, O> Inbox<T> for Link<I, O> {
    fn pop(&mut self) -> Result<T> {
        self.inbox.pop()
    }
}

impl<T, I, O: Outbox<T>> Outbox<T> for Link<I, O> {
    fn push(&mut self, item: T) -> Result<()> {
        self.outbox.push(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn preserves_single_producer_order() {
        let (mut tx, mut rx) = unbounded();
        for i in 0..100 {
            tx.push(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(rx.pop().unwrap(), i);
        }
    }

    #[test]
    fn concurrent_consumers_see_each_item_once() {
        let (mut tx, rx) = unbounded::<u32>();
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let mut rx = rx.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Ok(v) = rx.pop() {
                        seen.push(v);
                    }
                    seen
                })
            })
            .collect();
        drop(rx);

        for i in 0..1000 {
            tx.push(i).unwrap();
        }
        drop(tx);

        let mut all = HashSet::new();
        let mut total = 0;
        for handle in consumers {
            for v in handle.join().unwrap() {
                total += 1;
                assert!(all.insert(v), "item {v} delivered twice");
            }
        }
        assert_eq!(total, 1000);
    }

    #[test]
    fn closed_channels_report_errors() {
        let (mut tx, rx) = unbounded::<u8>();
        drop(rx);
        assert!(matches!(tx.push(1), Err(Error::ChannelClosed { .. })));

        let (tx, mut rx) = unbounded::<u8>();
        drop(tx);
        assert!(matches!(rx.pop(), Err(Error::ChannelClosed { .. })));
    }

    #[test]
    fn link_delegates_both_directions() {
        let (in_tx, in_rx) = unbounded::<u8>();
        let (out_tx, out_rx) = unbounded::<u8>();
        let mut link = Link::new(in_rx, out_tx);

        in_tx.send(4).unwrap();
        let v: u8 = link.pop().unwrap();
        link.push(v * 2).unwrap();
        assert_eq!(out_rx.recv().unwrap(), 8);
    }
}
