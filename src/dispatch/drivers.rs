//! # I/O Drivers
//!
//! Three ways of pumping a [`super::Dispatcher`] (§4.6, §5): a polling loop
//! that sleeps for a fixed tick between drains, a driver that waits on the
//! host's OS event (or a timeout) before draining, and a windowed driver
//! that is stepped once per message the host's window-message pump posts.
//! These are the only operations in the whole core that ever block —
//! every other method call returns immediately.
//!
//! All three expose the same five entry points: `handle` (drain whatever
//! is waiting, no blocking), `handle_for(duration)`, `handle_until(pred)`,
//! `handle_until_or_timeout(pred, duration)`, `handle_until_closed`.

use std::time::{Duration, Instant};

use crate::connection::Connection;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::transport::Transport;

fn drain<T: Transport>(dispatcher: &Dispatcher, connection: &mut Connection<T>) -> Result<bool> {
    dispatcher.drain_once(connection)
}

/// Sleeps for a fixed tick between drains. §6.4's `dispatch_interval`
/// configures the tick; the default is 10 ms.
pub struct PollingDriver {
    pub tick: Duration,
}

impl Default for PollingDriver {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
        }
    }
}

impl PollingDriver {
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }

    pub fn handle<T: Transport>(&self, dispatcher: &Dispatcher, connection: &mut Connection<T>) -> Result<()> {
        if connection.is_open() {
            drain(dispatcher, connection)?;
        }
        Ok(())
    }

    pub fn handle_for<T: Transport>(
        &self,
        dispatcher: &Dispatcher,
        connection: &mut Connection<T>,
        duration: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            if !connection.is_open() {
                break;
            }
            drain(dispatcher, connection)?;
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(self.tick.min(deadline.saturating_duration_since(Instant::now())));
        }
        Ok(())
    }

    pub fn handle_until<T: Transport>(
        &self,
        dispatcher: &Dispatcher,
        connection: &mut Connection<T>,
        mut predicate: impl FnMut() -> bool,
    ) -> Result<()> {
        loop {
            if !connection.is_open() {
                break;
            }
            drain(dispatcher, connection)?;
            if predicate() {
                break;
            }
            std::thread::sleep(self.tick);
        }
        Ok(())
    }

    pub fn handle_until_or_timeout<T: Transport>(
        &self,
        dispatcher: &Dispatcher,
        connection: &mut Connection<T>,
        mut predicate: impl FnMut() -> bool,
        duration: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            if !connection.is_open() {
                break;
            }
            drain(dispatcher, connection)?;
            if predicate() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(self.tick.min(deadline.saturating_duration_since(Instant::now())));
        }
        Ok(())
    }

    pub fn handle_until_closed<T: Transport>(&self, dispatcher: &Dispatcher, connection: &mut Connection<T>) -> Result<()> {
        while connection.is_open() {
            drain(dispatcher, connection)?;
            if connection.is_open() {
                std::thread::sleep(self.tick);
            }
        }
        Ok(())
    }
}

/// Waits on the host's auto-reset event (or the remaining budget) before
/// draining. `wait` returns `true` if the event signalled before the
/// timeout elapsed.
pub struct OsEventDriver<W: Fn(Duration) -> bool> {
    pub wait: W,
}

impl<W: Fn(Duration) -> bool> OsEventDriver<W> {
    pub fn new(wait: W) -> Self {
        Self { wait }
    }

    pub fn handle<T: Transport>(&self, dispatcher: &Dispatcher, connection: &mut Connection<T>) -> Result<()> {
        if connection.is_open() {
            drain(dispatcher, connection)?;
        }
        Ok(())
    }

    pub fn handle_for<T: Transport>(
        &self,
        dispatcher: &Dispatcher,
        connection: &mut Connection<T>,
        duration: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            if !connection.is_open() {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            (self.wait)(remaining);
            drain(dispatcher, connection)?;
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(())
    }

    pub fn handle_until<T: Transport>(
        &self,
        dispatcher: &Dispatcher,
        connection: &mut Connection<T>,
        mut predicate: impl FnMut() -> bool,
    ) -> Result<()> {
        loop {
            if !connection.is_open() {
                break;
            }
            (self.wait)(Duration::from_millis(100));
            drain(dispatcher, connection)?;
            if predicate() {
                break;
            }
        }
        Ok(())
    }

    pub fn handle_until_or_timeout<T: Transport>(
        &self,
        dispatcher: &Dispatcher,
        connection: &mut Connection<T>,
        mut predicate: impl FnMut() -> bool,
        duration: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            if !connection.is_open() {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            (self.wait)(remaining);
            drain(dispatcher, connection)?;
            if predicate() || Instant::now() >= deadline {
                break;
            }
        }
        Ok(())
    }

    pub fn handle_until_closed<T: Transport>(&self, dispatcher: &Dispatcher, connection: &mut Connection<T>) -> Result<()> {
        while connection.is_open() {
            (self.wait)(Duration::from_millis(100));
            drain(dispatcher, connection)?;
        }
        Ok(())
    }
}

/// Stepped once per message the host's window pump posts. `pump_once`
/// asks the host to process a single posted message and returns whether
/// one was actually available; the driver never sleeps itself, since the
/// host's own message loop is what blocks.
pub struct WindowedDriver<P: FnMut() -> bool> {
    pub pump_once: P,
}

impl<P: FnMut() -> bool> WindowedDriver<P> {
    pub fn new(pump_once: P) -> Self {
        Self { pump_once }
    }

    pub fn handle<T: Transport>(&mut self, dispatcher: &Dispatcher, connection: &mut Connection<T>) -> Result<()> {
        if connection.is_open() {
            drain(dispatcher, connection)?;
        }
        Ok(())
    }

    pub fn handle_for<T: Transport>(
        &mut self,
        dispatcher: &Dispatcher,
        connection: &mut Connection<T>,
        duration: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            if !connection.is_open() || Instant::now() >= deadline {
                break;
            }
            (self.pump_once)();
            drain(dispatcher, connection)?;
        }
        Ok(())
    }

    pub fn handle_until<T: Transport>(
        &mut self,
        dispatcher: &Dispatcher,
        connection: &mut Connection<T>,
        mut predicate: impl FnMut() -> bool,
    ) -> Result<()> {
        loop {
            if !connection.is_open() || predicate() {
                break;
            }
            (self.pump_once)();
            drain(dispatcher, connection)?;
        }
        Ok(())
    }

    pub fn handle_until_or_timeout<T: Transport>(
        &mut self,
        dispatcher: &Dispatcher,
        connection: &mut Connection<T>,
        mut predicate: impl FnMut() -> bool,
        duration: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            if !connection.is_open() || predicate() || Instant::now() >= deadline {
                break;
            }
            (self.pump_once)();
            drain(dispatcher, connection)?;
        }
        Ok(())
    }

    pub fn handle_until_closed<T: Transport>(&mut self, dispatcher: &Dispatcher, connection: &mut Connection<T>) -> Result<()> {
        while connection.is_open() {
            (self.pump_once)();
            drain(dispatcher, connection)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, OpenMode};

    #[test]
    fn polling_driver_handle_drains_without_blocking() {
        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        let dispatcher = Dispatcher::new();
        let driver = PollingDriver::default();
        driver.handle(&dispatcher, &mut conn).unwrap();
    }

    #[test]
    fn polling_driver_handle_until_closed_stops_when_closed() {
        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        conn.close().unwrap();
        let dispatcher = Dispatcher::new();
        let driver = PollingDriver::new(Duration::from_millis(1));
        driver.handle_until_closed(&dispatcher, &mut conn).unwrap();
    }

    #[test]
    fn windowed_driver_pumps_until_predicate_true() {
        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        let dispatcher = Dispatcher::new();
        let mut pumps = 0;
        let mut driver = WindowedDriver::new(|| {
            pumps += 1;
            true
        });
        let mut iterations = 0;
        driver
            .handle_until(&dispatcher, &mut conn, || {
                iterations += 1;
                iterations >= 3
            })
            .unwrap();
        assert_eq!(iterations, 3);
    }
}
