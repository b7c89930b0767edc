use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// Address family, each stored with its own fixed width
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// IPv4-mapped IPv6 addresses belong to [Family::V4]
    pub fn of(address: &IpAddr) -> Self {
        match address.to_canonical() {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("ipv4"),
            Self::V6 => f.write_str("ipv6"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntervalError {
    #[error("Interval bounds {start} and {end} belong to different address families")]
    FamilyMismatch { start: IpAddr, end: IpAddr },
    #[error("Interval start {start} is greater than its end {end}")]
    Reversed { start: IpAddr, end: IpAddr },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Bounds {
    V4(Ipv4Addr, Ipv4Addr),
    V6(Ipv6Addr, Ipv6Addr),
}

/// Inclusive address range with its location
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interval {
    pub(crate) bounds: Bounds,
    pub(crate) location: Location,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub country_name: String,
    pub continent_name: String,
}

impl Interval {
    pub fn new(
        start: IpAddr,
        end: IpAddr,
        country_name: impl Into<String>,
        continent_name: impl Into<String>,
    ) -> Result<Self, IntervalError> {
        let bounds = match (start.to_canonical(), end.to_canonical()) {
            (IpAddr::V4(start), IpAddr::V4(end)) => Bounds::V4(start, end),
            (IpAddr::V6(start), IpAddr::V6(end)) => Bounds::V6(start, end),
            (start, end) => return Err(IntervalError::FamilyMismatch { start, end }),
        };
        let interval = Self {
            bounds,
            location: Location {
                country_name: country_name.into(),
                continent_name: continent_name.into(),
            },
        };
        if interval.start() > interval.end() {
            return Err(IntervalError::Reversed {
                start: interval.start(),
                end: interval.end(),
            });
        }
        Ok(interval)
    }

    pub(crate) fn from_parts(bounds: Bounds, location: Location) -> Self {
        Self { bounds, location }
    }

    pub fn start(&self) -> IpAddr {
        match self.bounds {
            Bounds::V4(start, _) => start.into(),
            Bounds::V6(start, _) => start.into(),
        }
    }

    pub fn end(&self) -> IpAddr {
        match self.bounds {
            Bounds::V4(_, end) => end.into(),
            Bounds::V6(_, end) => end.into(),
        }
    }

    pub fn family(&self) -> Family {
        match self.bounds {
            Bounds::V4(..) => Family::V4,
            Bounds::V6(..) => Family::V6,
        }
    }

    pub fn country_name(&self) -> &str {
        &self.location.country_name
    }

    pub fn continent_name(&self) -> &str {
        &self.location.continent_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn family_of_mapped_address() {
        assert_eq!(Family::of(&ip("10.0.0.1")), Family::V4);
        assert_eq!(Family::of(&ip("::ffff:10.0.0.1")), Family::V4);
        assert_eq!(Family::of(&ip("2001:db8::1")), Family::V6);
        // IPv4-compatible addresses have no 4-byte form
        assert_eq!(Family::of(&ip("::1")), Family::V6);
    }

    #[test]
    fn mapped_bounds_are_canonicalized() {
        let interval = Interval::new(ip("::ffff:1.2.3.0"), ip("1.2.3.255"), "", "").unwrap();
        assert_eq!(interval.family(), Family::V4);
        assert_eq!(interval.start(), ip("1.2.3.0"));
    }

    #[test]
    fn mixed_families() {
        let error = Interval::new(ip("1.2.3.0"), ip("2001:db8::"), "", "").unwrap_err();
        assert!(matches!(error, IntervalError::FamilyMismatch { .. }));
    }

    #[test]
    fn reversed() {
        let error = Interval::new(ip("1.2.3.4"), ip("1.2.3.3"), "", "").unwrap_err();
        assert_eq!(
            error,
            IntervalError::Reversed {
                start: ip("1.2.3.4"),
                end: ip("1.2.3.3"),
            }
        );
        assert!(Interval::new(ip("1.2.3.4"), ip("1.2.3.4"), "", "").is_ok());
    }
}
