//! IP set membership
//!
//! The store only needs to create sets and add or remove members by string.
//! How members are represented is up to the [`IpSetFactory`] the store was
//! built with; [`DefaultIpSetFactory`] keeps canonicalised strings in a hash set.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use ward_proto::IpSetType;

/// A named set of addresses, ports or networks
///
/// Adding a present member and removing an absent one are both no-ops.
pub trait IpSet: fmt::Debug + Send + Sync {
    /// The type the set was created with
    fn set_type(&self) -> IpSetType;

    /// Add a member
    fn add_member(&mut self, member: &str);

    /// Remove a member
    fn remove_member(&mut self, member: &str);

    /// Check whether a member is present
    fn contains_member(&self, member: &str) -> bool;

    /// Number of members
    fn len(&self) -> usize;

    /// True when the set has no members
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Creates empty IP sets of a given type
#[cfg_attr(test, mockall::automock)]
pub trait IpSetFactory: Send + Sync {
    /// Create an empty set that interprets members according to `set_type`
    fn create(&self, set_type: IpSetType) -> Box<dyn IpSet>;
}

/// Factory for [`MemberSet`]
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultIpSetFactory;

impl IpSetFactory for DefaultIpSetFactory {
    fn create(&self, set_type: IpSetType) -> Box<dyn IpSet> {
        Box::new(MemberSet::new(set_type))
    }
}

/// Hash-set backed [`IpSet`]
///
/// Members are canonicalised before storage so that `::1` and
/// `0:0:0:0:0:0:0:1` are the same member. Strings that don't parse for the
/// set's type are stored as given.
#[derive(Clone, Debug)]
pub struct MemberSet {
    set_type: IpSetType,
    members: HashSet<String>,
}

impl MemberSet {
    /// Create an empty set
    pub fn new(set_type: IpSetType) -> Self {
        Self {
            set_type,
            members: HashSet::new(),
        }
    }

    /// Iterate over the canonical members
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }
}

impl IpSet for MemberSet {
    fn set_type(&self) -> IpSetType {
        self.set_type
    }

    fn add_member(&mut self, member: &str) {
        self.members.insert(canonical_member(self.set_type, member));
    }

    fn remove_member(&mut self, member: &str) {
        self.members.remove(&canonical_member(self.set_type, member));
    }

    fn contains_member(&self, member: &str) -> bool {
        self.members
            .contains(&canonical_member(self.set_type, member))
    }

    fn len(&self) -> usize {
        self.members.len()
    }
}

/// Normalise a member string for the given set type (pure function)
pub fn canonical_member(set_type: IpSetType, member: &str) -> String {
    let member = member.trim();
    match set_type {
        IpSetType::Ip => canonical_addr(member),
        IpSetType::Net => match member.split_once('/') {
            Some((addr, prefix)) => match (addr.parse::<IpAddr>(), prefix.parse::<u8>()) {
                (Ok(addr), Ok(prefix)) => format!("{addr}/{prefix}"),
                _ => member.to_string(),
            },
            // A bare address is a host network
            None => match member.parse::<IpAddr>() {
                Ok(addr @ IpAddr::V4(_)) => format!("{addr}/32"),
                Ok(addr @ IpAddr::V6(_)) => format!("{addr}/128"),
                Err(_) => member.to_string(),
            },
        },
        IpSetType::IpAndPort => match member.split_once(',') {
            Some((addr, port)) => format!("{},{}", canonical_addr(addr), port.to_lowercase()),
            None => member.to_string(),
        },
    }
}

fn canonical_addr(addr: &str) -> String {
    addr.parse::<IpAddr>()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| addr.to_string())
}
