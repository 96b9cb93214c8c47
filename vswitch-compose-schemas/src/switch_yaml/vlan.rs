use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};

pub const MAX_VLAN_ID: u16 = 4094;

/// Inclusive VLAN id range used by trunk ports.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub struct VlanRange {
    pub min_vlan: u16,
    pub max_vlan: u16,
}

impl VlanRange {
    pub fn new(min_vlan: u16, max_vlan: u16) -> Self {
        Self { min_vlan, max_vlan }
    }

    pub fn is_valid(&self) -> bool {
        self.min_vlan <= self.max_vlan && self.max_vlan <= MAX_VLAN_ID
    }

    fn overlaps(&self, other: &VlanRange) -> bool {
        self.min_vlan <= other.max_vlan && other.min_vlan <= self.max_vlan
    }
}

/// VLAN mode of the switch's default port configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VlanConfig {
    Untagged,
    Single(u16),
    /// compared as a set, the platform does not keep the order ranges were declared in
    Trunk(BTreeSet<VlanRange>),
    /// a VLAN spec type reported by the platform that this crate does not know about
    Unrecognized(String),
}

impl VlanConfig {
    /// Merge overlapping trunk ranges, other variants are returned as is. This is the form
    /// that is sent to the platform, so it is also the form used when comparing.
    pub fn normalized(&self) -> VlanConfig {
        match self {
            VlanConfig::Trunk(ranges) => VlanConfig::Trunk(merge_trunk_ranges(ranges)),
            other => other.clone(),
        }
    }
}

pub fn merge_trunk_ranges(ranges: &BTreeSet<VlanRange>) -> BTreeSet<VlanRange> {
    let mut merged: Vec<VlanRange> = Vec::with_capacity(ranges.len());
    // BTreeSet iterates in (min, max) order
    for range in ranges {
        match merged.last_mut() {
            Some(last) if last.overlaps(range) => {
                last.max_vlan = last.max_vlan.max(range.max_vlan);
            }
            _ => merged.push(*range),
        }
    }
    merged.into_iter().collect()
}
