//! Port leasing between concurrently running test executions
//!
//! Ports are handed out as exclusive leases from a bounded range so that
//! concurrently started application and helper processes never race for the
//! same port number. Leases are plain bookkeeping: nothing is bound here, the
//! holder is expected to pass the number to the process it starts and to
//! release the lease when that process stops.

use std::collections::HashSet;

use parking_lot::Mutex;
use rand::Rng;

use crate::error::{Error, Result};

/// Service for acquiring a lease on a network port number between concurrent
/// test executions sharing one instance.
///
/// A port picked at random from the available set (instead of the first free
/// one) keeps rapid lease/release cycles from systematically reusing the same
/// number while an externally spawned process may still be letting go of it.
#[derive(Debug)]
pub struct PortLeaseManager {
    lower_bound: u16,
    upper_bound: u16,
    leased: Mutex<HashSet<u16>>,
}

impl PortLeaseManager {
    /// Creates a manager handing out ports from the closed-open range
    /// `lower_bound..upper_bound`.
    pub fn new(lower_bound: u16, upper_bound: u16) -> Self {
        Self {
            lower_bound,
            upper_bound,
            leased: Mutex::new(HashSet::new()),
        }
    }

    /// Leases a random port from the available portion of the range.
    ///
    /// Fails with [`Error::PortsExhausted`] when every port in the range is
    /// currently leased; the caller has to treat that as fatal for the
    /// requesting operation.
    pub fn lease_available_random_port(&self) -> Result<u16> {
        let mut leased = self.leased.lock();

        let available: Vec<u16> = (self.lower_bound..self.upper_bound)
            .filter(|port| !leased.contains(port))
            .collect();

        if available.is_empty() {
            return Err(Error::PortsExhausted {
                lower_bound: self.lower_bound,
                upper_bound: self.upper_bound,
            });
        }

        let port = available[rand::thread_rng().gen_range(0..available.len())];
        leased.insert(port);

        Ok(port)
    }

    /// Releases a previously leased port. Releasing a port that isn't leased
    /// is a no-op.
    pub fn stop_lease(&self, port: u16) {
        self.leased.lock().remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn leases_are_exclusive_under_concurrency() {
        let manager = Arc::new(PortLeaseManager::new(7000, 7010));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.lease_available_random_port().unwrap())
            })
            .collect();

        let mut ports: Vec<u16> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ports.sort_unstable();
        ports.dedup();

        assert_eq!(ports.len(), 10);
        assert!(ports.iter().all(|port| (7000..7010).contains(port)));

        // The range is fully leased now, so one more request has to fail.
        assert!(matches!(
            manager.lease_available_random_port(),
            Err(Error::PortsExhausted { .. })
        ));
    }

    #[test]
    fn exhausted_range_fails_with_capacity_error() {
        let manager = PortLeaseManager::new(7000, 7010);

        for _ in 0..10 {
            manager.lease_available_random_port().unwrap();
        }

        match manager.lease_available_random_port() {
            Err(Error::PortsExhausted { lower_bound: 7000, upper_bound: 7010 }) => {}
            other => panic!("expected a capacity error, got {other:?}"),
        }
    }

    #[test]
    fn released_port_becomes_available_again() {
        let manager = PortLeaseManager::new(9000, 9001);

        let port = manager.lease_available_random_port().unwrap();
        assert_eq!(port, 9000);
        assert!(manager.lease_available_random_port().is_err());

        manager.stop_lease(port);
        assert_eq!(manager.lease_available_random_port().unwrap(), 9000);
    }

    #[test]
    fn releasing_an_unleased_port_is_a_no_op() {
        let manager = PortLeaseManager::new(9000, 9002);

        manager.stop_lease(9000);
        manager.stop_lease(12345);

        assert!(manager.lease_available_random_port().is_ok());
        assert!(manager.lease_available_random_port().is_ok());
        assert!(manager.lease_available_random_port().is_err());
    }
}
