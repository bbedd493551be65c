// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Round-robin distribution of requests over several services.

use crate::error::IoError;
use crate::service::{IoService, ServiceStats};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A fixed, non-empty set of services handed out in turn.
///
/// ```no_run
/// use khora_io::{RamService, ServiceConfig, ServicePool};
///
/// # fn main() -> Result<(), khora_io::IoError> {
/// let pool = ServicePool::from_fn(4, |i| RamService::create(ServiceConfig::new(format!("ram-{i}"))))?;
/// let service = pool.next();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ServicePool<S> {
    services: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> ServicePool<S> {
    /// Wraps `services`.
    ///
    /// # Errors
    /// [`IoError::Config`] if `services` is empty.
    pub fn new(services: Vec<S>) -> Result<Self, IoError> {
        if services.is_empty() {
            return Err(IoError::Config("a service pool needs at least one service".to_string()));
        }
        Ok(Self {
            services,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Builds `count` services with `make`, stopping at the first error.
    pub fn from_fn<F>(count: usize, make: F) -> Result<Self, IoError>
    where
        F: FnMut(usize) -> Result<S, IoError>,
    {
        Self::new((0..count).map(make).collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns the next service in round-robin order.
    pub fn next(&self) -> &S {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.services.len();
        &self.services[index]
    }

    /// Returns the service at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&S> {
        self.services.get(index)
    }

    /// Number of services in the pool.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Always `false`: a pool holds at least one service.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterates over the services in pool order.
    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.services.iter()
    }
}

impl<S: IoService> ServicePool<S> {
    /// Drains every service of the pool in turn.
    pub fn drain_all(&self) {
        for service in &self.services {
            service.drain();
        }
    }

    /// The sum of every service's counters.
    pub fn stats(&self) -> ServiceStats {
        self.services
            .iter()
            .fold(ServiceStats::default(), |mut total, service| {
                total.merge(&service.stats());
                total
            })
    }
}

impl<'a, S> IntoIterator for &'a ServicePool<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
