use super::interval::{Bounds, Interval, Location};
use crate::intervals::IntervalVec;

use std::net::IpAddr;

/// Immutable indexed interval set, one index per address family
#[derive(Clone, Debug, Default)]
pub struct IntervalSet {
    ipv4: IntervalVec<u32, Location>,
    ipv6: IntervalVec<u128, Location>,
}

impl IntervalSet {
    pub fn from_intervals(intervals: Vec<Interval>) -> Self {
        let mut ipv4 = vec![];
        let mut ipv6 = vec![];
        for Interval { bounds, location } in intervals {
            match bounds {
                Bounds::V4(start, end) => ipv4.push((start.into(), end.into(), location)),
                Bounds::V6(start, end) => ipv6.push((start.into(), end.into(), location)),
            }
        }
        Self {
            ipv4: IntervalVec::from_unsorted(ipv4),
            ipv6: IntervalVec::from_unsorted(ipv6),
        }
    }

    pub fn find_containing(&self, address: IpAddr) -> Option<Interval> {
        match address.to_canonical() {
            IpAddr::V4(ip) => self.ipv4.get_entry(ip.into()).map(|(start, end, location)| {
                Interval::from_parts(Bounds::V4(start.into(), end.into()), location.clone())
            }),
            IpAddr::V6(ip) => self.ipv6.get_entry(ip.into()).map(|(start, end, location)| {
                Interval::from_parts(Bounds::V6(start.into(), end.into()), location.clone())
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Interval> + '_ {
        let ipv4 = self.ipv4.iter().map(|(start, end, location)| {
            Interval::from_parts(Bounds::V4(start.into(), end.into()), location.clone())
        });
        let ipv6 = self.ipv6.iter().map(|(start, end, location)| {
            Interval::from_parts(Bounds::V6(start.into(), end.into()), location.clone())
        });
        ipv4.chain(ipv6)
    }

    pub fn ipv4_len(&self) -> usize {
        self.ipv4.len()
    }

    pub fn ipv6_len(&self) -> usize {
        self.ipv6.len()
    }

    pub fn len(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }
}
