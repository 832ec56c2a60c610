use crate::cancel::CancelToken;
use crate::Error;
use crossbeam_channel::{select, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Handle given to the producer. Dropping it closes the queue.
pub struct Dispatch<'a, M> {
    sender: Sender<M>,
    failed: &'a CancelToken,
    cancel: &'a CancelToken,
}

impl<M> Dispatch<'_, M> {
    /// Blocks until a worker takes `m`.
    ///
    /// Returns `false` without sending if a worker has failed, the caller has cancelled,
    /// or all workers are gone. The producer should stop then; the pool reports the reason.
    pub fn send(&self, m: M) -> bool {
        if self.is_stopped() {
            return false;
        }
        select! {
            send(self.sender, m) -> res => res.is_ok(),
            recv(self.failed.receiver()) -> _ => false,
            recv(self.cancel.receiver()) -> _ => false,
        }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.failed.is_cancelled() || self.cancel.is_cancelled()
    }
}

/// Runs `producer` on the current thread and `consumer` on `num_threads` scoped threads,
/// connected by a zero-capacity queue, so the producer can't run ahead of the workers.
///
/// The first consumer error stops the producer and the other workers (in-flight messages
/// are allowed to finish), and is the error returned.
pub fn new<P, C, M, R>(num_threads: usize, name: &str, cancel: &CancelToken, producer: P, mut consumer: C) -> Result<R, Error> where
    M: Send,
    C: Clone + Send + FnMut(M) -> Result<(), Error>,
    P: FnOnce(&Dispatch<'_, M>) -> Result<R, Error>,
{
    if num_threads == 0 {
        return Err(Error::InvalidSettings("the worker pool needs at least one thread"));
    }

    let failed = &CancelToken::new();
    let first_error = &Mutex::new(None);
    let fail = move |e: Error| {
        let mut slot = match first_error.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.get_or_insert(e);
        failed.cancel();
    };

    let res = std::thread::scope(move |scope| {
        let (s, r) = crossbeam_channel::bounded(0);
        let thread = move || {
            let res = catch_unwind(AssertUnwindSafe(move || {
                for m in r {
                    if failed.is_cancelled() || cancel.is_cancelled() {
                        break;
                    }
                    consumer(m)?;
                }
                Ok::<_, Error>(())
            }));
            match res {
                Ok(Ok(())) => {},
                Ok(Err(e)) => fail(e),
                Err(_) => fail(Error::ThreadSend),
            }
        };
        let spawn = move |n, thread| {
            std::thread::Builder::new().name(format!("{name}{n}")).spawn_scoped(scope, thread).map_err(|_| {
                fail(Error::ThreadSend);
            })
        };
        let mut handles = Vec::with_capacity(num_threads);
        for n in 0..num_threads-1 {
            if spawn(n, thread.clone()).map(|h| handles.push(h)).is_err() {
                return None;
            }
        }
        if spawn(num_threads-1, thread).map(|h| handles.push(h)).is_err() {
            return None;
        }

        let dispatch = Dispatch { sender: s, failed, cancel };
        let res = producer(&dispatch);
        // Closes the queue, so that idle workers exit
        drop(dispatch);
        for h in handles {
            if h.join().is_err() {
                fail(Error::ThreadSend);
            }
        }
        Some(res)
    });

    let worker_error = match first_error.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    match (worker_error, res) {
        (Some(e), _) => Err(e),
        (None, Some(res)) => res,
        (None, None) => Err(Error::ThreadSend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

    #[test]
    fn consumes_every_message_once() {
        let sum = AtomicUsize::new(0);
        let count = AtomicUsize::new(0);
        let sent = new(4, "test", &CancelToken::new(), |d| {
            let mut sent = 0;
            for i in 1..=100 {
                assert!(d.send(i));
                sent += 1;
            }
            Ok(sent)
        }, |i: usize| {
            sum.fetch_add(i, SeqCst);
            count.fetch_add(1, SeqCst);
            Ok(())
        }).unwrap();
        assert_eq!(sent, 100);
        assert_eq!(count.load(SeqCst), 100);
        assert_eq!(sum.load(SeqCst), 5050);
    }

    #[test]
    fn worker_error_stops_producer() {
        let res = new(2, "test", &CancelToken::new(), |d| {
            let mut sent = 0;
            for i in 0..1000 {
                if !d.send(i) {
                    break;
                }
                sent += 1;
            }
            Ok(sent)
        }, |i: usize| {
            if i == 3 { Err(Error::NoFrames) } else { Ok(()) }
        });
        assert!(matches!(res, Err(Error::NoFrames)));
    }

    #[test]
    fn panicking_worker_is_an_error() {
        let res = new(1, "test", &CancelToken::new(), |d| {
            while d.send(()) {}
            Ok(())
        }, |_: ()| -> Result<(), Error> { panic!("worker died") });
        assert!(matches!(res, Err(Error::ThreadSend)));
    }

    #[test]
    fn zero_threads_is_rejected() {
        let res = new(0, "test", &CancelToken::new(), |_: &Dispatch<'_, ()>| Ok(()), |_: ()| Ok(()));
        assert!(matches!(res, Err(Error::InvalidSettings(_))));
    }
}
