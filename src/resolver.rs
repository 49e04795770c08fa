use std::{
    fmt::{self, Debug, Display},
    io,
    net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs},
};

use url::Host;

use crate::error::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Family::V4 => "IPv4",
                Family::V6 => "IPv6",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilyPreference {
    Ipv4Only,
    Ipv6Only,
    #[default]
    Both,
}

impl FamilyPreference {
    /// Families to look up, in the order their candidates are emitted.
    pub fn families(self) -> &'static [Family] {
        match self {
            FamilyPreference::Ipv4Only => &[Family::V4],
            FamilyPreference::Ipv6Only => &[Family::V6],
            FamilyPreference::Both => &[Family::V4, Family::V6],
        }
    }

    fn kind(self) -> &'static str {
        match self {
            FamilyPreference::Ipv4Only => "IPv4",
            FamilyPreference::Ipv6Only => "IPv6",
            FamilyPreference::Both => "any",
        }
    }
}

/// Address a probe may connect to, tagged with its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    family: Family,
    ip: IpAddr,
}

impl Candidate {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            family: Family::of(&ip),
            ip,
        }
    }

    #[inline]
    pub fn family(&self) -> Family {
        self.family
    }

    #[inline]
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// IPv6 addresses get zero flow info and scope id.
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        match self.ip {
            IpAddr::V4(ip) => SocketAddr::V4(SocketAddrV4::new(ip, port)),
            IpAddr::V6(ip) => SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0)),
        }
    }
}

impl From<IpAddr> for Candidate {
    fn from(ip: IpAddr) -> Self {
        Self::new(ip)
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ip, self.family)
    }
}

/// Name to address lookup restricted to one family.
pub trait Lookup: Debug + Sync {
    fn lookup(&self, target: &str, family: Family) -> io::Result<Vec<IpAddr>>;
}

/// Resolves through the operating system resolver.
#[derive(Debug, Default)]
pub struct SystemLookup;

impl SystemLookup {
    fn host(target: &str) -> io::Result<Host<String>> {
        // Bare IPv6 literals aren't accepted by the URL host parser.
        if let Ok(ip) = target.parse::<IpAddr>() {
            return Ok(match ip {
                IpAddr::V4(ip) => Host::Ipv4(ip),
                IpAddr::V6(ip) => Host::Ipv6(ip),
            });
        }

        Host::parse(target).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}

impl Lookup for SystemLookup {
    fn lookup(&self, target: &str, family: Family) -> io::Result<Vec<IpAddr>> {
        let ips = match Self::host(target)? {
            Host::Domain(dmn) => (dmn.as_str(), 0 /* dummy port */)
                .to_socket_addrs()?
                .map(|saddr| saddr.ip())
                .collect(),
            Host::Ipv4(ip) => vec![IpAddr::V4(ip)],
            Host::Ipv6(ip) => vec![IpAddr::V6(ip)],
        };

        Ok(ips
            .into_iter()
            .filter(|ip| Family::of(ip) == family)
            .collect())
    }
}

pub fn resolve(target: &str, preference: FamilyPreference) -> Result<Vec<Candidate>, ScanError> {
    resolve_with(&SystemLookup, target, preference)
}

/// Collects candidates family by family, keeping the first occurrence of
/// each address. A family that fails to resolve contributes nothing; only
/// an empty overall result is an error.
pub fn resolve_with(
    lookup: &dyn Lookup,
    target: &str,
    preference: FamilyPreference,
) -> Result<Vec<Candidate>, ScanError> {
    let mut candidates: Vec<Candidate> = Vec::new();

    for &family in preference.families() {
        let ips = match lookup.lookup(target, family) {
            Ok(ips) => ips,
            Err(e) => {
                log::debug!("No {} address for `{}`: {}", family, target, e);
                continue;
            }
        };

        for ip in ips.into_iter().filter(|ip| Family::of(ip) == family) {
            let candidate = Candidate::new(ip);
            if !candidates.contains(&candidate) {
                log::debug!("Found {} `{}` mapped by target `{}`", family, ip, target);
                candidates.push(candidate);
            }
        }
    }

    if candidates.is_empty() {
        return Err(ScanError::Unresolved {
            target: target.into(),
            kind: preference.kind(),
        });
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::{Ipv4Addr, Ipv6Addr},
        sync::Mutex,
    };

    use super::*;

    #[derive(Debug, Default)]
    struct FakeLookup {
        records: HashMap<Family, Vec<IpAddr>>,
        asked: Mutex<Vec<Family>>,
    }

    impl FakeLookup {
        fn with(mut self, family: Family, ips: &[IpAddr]) -> Self {
            self.records.insert(family, ips.to_vec());
            self
        }
    }

    impl Lookup for FakeLookup {
        fn lookup(&self, _: &str, family: Family) -> io::Result<Vec<IpAddr>> {
            self.asked.lock().unwrap().push(family);
            self.records
                .get(&family)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no records"))
        }
    }

    fn v4(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, last))
    }

    fn v6(last: u16) -> IpAddr {
        IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, last))
    }

    #[test]
    fn both_lists_ipv4_before_ipv6_without_duplicates() {
        let lookup = FakeLookup::default()
            .with(Family::V6, &[v6(1), v6(2), v6(1)])
            .with(Family::V4, &[v4(7), v4(3), v4(7)]);

        let candidates = resolve_with(&lookup, "host", FamilyPreference::Both).unwrap();
        let ips: Vec<IpAddr> = candidates.iter().map(Candidate::ip).collect();

        assert_eq!(ips, vec![v4(7), v4(3), v6(1), v6(2)]);
        assert_eq!(candidates[0].family(), Family::V4);
        assert_eq!(candidates[3].family(), Family::V6);
    }

    #[test]
    fn single_family_preference_only_asks_that_family() {
        let lookup = FakeLookup::default()
            .with(Family::V4, &[v4(1)])
            .with(Family::V6, &[v6(1)]);

        let candidates = resolve_with(&lookup, "host", FamilyPreference::Ipv6Only).unwrap();

        assert_eq!(candidates, vec![Candidate::new(v6(1))]);
        assert_eq!(*lookup.asked.lock().unwrap(), vec![Family::V6]);
    }

    #[test]
    fn failed_family_falls_back_to_the_next() {
        let lookup = FakeLookup::default().with(Family::V6, &[v6(9)]);

        let candidates = resolve_with(&lookup, "host", FamilyPreference::Both).unwrap();

        assert_eq!(candidates, vec![Candidate::new(v6(9))]);
        assert_eq!(*lookup.asked.lock().unwrap(), vec![Family::V4, Family::V6]);
    }

    #[test]
    fn addresses_of_the_wrong_family_are_ignored() {
        let lookup = FakeLookup::default().with(Family::V4, &[v6(1), v4(1)]);

        let candidates = resolve_with(&lookup, "host", FamilyPreference::Ipv4Only).unwrap();

        assert_eq!(candidates, vec![Candidate::new(v4(1))]);
    }

    #[test]
    fn no_records_in_any_family_is_an_error() {
        let lookup = FakeLookup::default();

        match resolve_with(&lookup, "nowhere", FamilyPreference::Both) {
            Err(ScanError::Unresolved { target, kind }) => {
                assert_eq!(target, "nowhere");
                assert_eq!(kind, "any");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn ipv6_socket_addr_has_zero_flow_and_scope() {
        match Candidate::new(v6(1)).socket_addr(443) {
            SocketAddr::V6(saddr) => {
                assert_eq!(saddr.port(), 443);
                assert_eq!(saddr.flowinfo(), 0);
                assert_eq!(saddr.scope_id(), 0);
            }
            SocketAddr::V4(_) => panic!("expected an IPv6 socket address"),
        }
    }

    #[test]
    fn system_lookup_handles_ip_literals() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);

        assert_eq!(
            SystemLookup.lookup("127.0.0.1", Family::V4).unwrap(),
            vec![loopback]
        );
        assert!(SystemLookup.lookup("127.0.0.1", Family::V6).unwrap().is_empty());
        assert_eq!(
            SystemLookup.lookup("::1", Family::V6).unwrap(),
            vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]
        );
        assert_eq!(
            SystemLookup.lookup("[::1]", Family::V6).unwrap(),
            vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]
        );
    }

    #[test]
    fn literal_of_the_other_family_is_unresolved() {
        let result = resolve("127.0.0.1", FamilyPreference::Ipv6Only);

        assert!(matches!(result, Err(ScanError::Unresolved { kind: "IPv6", .. })));
    }
}
