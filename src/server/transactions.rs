use super::allocator::AllocatedAddress;
use super::error::Error;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Bridges a DISCOVER/OFFER exchange to the REQUEST that follows it.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub xid: u32,
    pub offered: AllocatedAddress,
    pub lease_time: u32,
    created: Instant,
}

impl Transaction {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        return now.duration_since(self.created) < ttl;
    }
}

/// Transactions by xid. Entries older than the TTL are treated as absent and
/// the store never holds more than `capacity` of them.
#[derive(Debug)]
pub struct TransactionStore {
    transactions: HashMap<u32, Transaction>,
    ttl: Duration,
    capacity: usize,
}

impl TransactionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        return Self {
            transactions: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        };
    }

    pub fn create(&mut self, xid: u32, offered: AllocatedAddress) {
        if !self.transactions.contains_key(&xid)
            && self.transactions.len() >= self.capacity
        {
            self.evict_expired();
            if self.transactions.len() >= self.capacity {
                self.evict_oldest();
            }
        }

        let lease_time = offered.lease_time;
        self.transactions.insert(
            xid,
            Transaction {
                xid,
                offered,
                lease_time,
                created: Instant::now(),
            },
        );
    }

    pub fn exists(&self, xid: u32) -> bool {
        return self.get(xid).is_ok();
    }

    pub fn get(&self, xid: u32) -> Result<&Transaction, Error> {
        let now = Instant::now();
        return self
            .transactions
            .get(&xid)
            .filter(|t| t.is_live(now, self.ttl))
            .ok_or(Error::NoTransaction(xid));
    }

    pub fn remove(&mut self, xid: u32) -> Option<Transaction> {
        return self.transactions.remove(&xid);
    }

    /// Drops the transactions whose TTL is over, returning how many.
    pub fn evict_expired(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = self.transactions.len();
        self.transactions.retain(|_, t| t.is_live(now, ttl));

        return before - self.transactions.len();
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .transactions
            .values()
            .min_by_key(|t| t.created)
            .map(|t| t.xid);

        if let Some(xid) = oldest {
            self.transactions.remove(&xid);
        }
    }

    pub fn len(&self) -> usize {
        return self.transactions.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.transactions.is_empty();
    }
}
