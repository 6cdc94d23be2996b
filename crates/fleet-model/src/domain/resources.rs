use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Resource name for CPU shares.
pub const CPUS: &str = "cpus";
/// Resource name for memory, in megabytes.
pub const MEM: &str = "mem";

/// Tolerance for comparing fractional scalars, so `0.3` cpus really fit three `0.1` tasks.
const EPSILON: f64 = 1e-9;

/// Named scalar resources (`cpus`, `mem`, or anything else the manager advertises).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(BTreeMap<String, f64>);

impl Resources {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build from raw `(name, value)` entries; repeated names are summed.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut out = BTreeMap::new();
        for (name, value) in entries {
            *out.entry(name.into()).or_insert(0.0) += value;
        }
        Self(out)
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Scalar value for `name`; absent resources count as zero.
    pub fn scalar(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn cpus(&self) -> f64 {
        self.scalar(CPUS)
    }

    pub fn mem(&self) -> f64 {
        self.scalar(MEM)
    }

    /// Returns `true` if one task of `demand` fits into these resources.
    pub fn fits(&self, demand: &ResourceDemand) -> bool {
        self.cpus() + EPSILON >= demand.cpu && self.mem() + EPSILON >= demand.mem
    }

    /// Take one task's worth of `demand` out, clamping at zero.
    pub fn subtract(&mut self, demand: &ResourceDemand) {
        for (name, need) in [(CPUS, demand.cpu), (MEM, demand.mem)] {
            let left = self.scalar(name) - need;
            self.0
                .insert(name.to_string(), if left < EPSILON { 0.0 } else { left });
        }
    }

    /// Give one task's worth of `demand` back.
    pub fn add(&mut self, demand: &ResourceDemand) {
        *self.0.entry(CPUS.to_string()).or_insert(0.0) += demand.cpu;
        *self.0.entry(MEM.to_string()).or_insert(0.0) += demand.mem;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Returns `true` if every scalar is (numerically) zero.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.abs() < EPSILON)
    }
}

/// Fixed per-task requirement, configured once at scheduler startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceDemand {
    pub cpu: f64,
    pub mem: f64,
}

impl ResourceDemand {
    pub fn new(cpu: f64, mem: f64) -> Result<Self, ModelError> {
        for (name, value) in [(CPUS, cpu), (MEM, mem)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ModelError::InvalidDemand(format!("{name}={value}")));
            }
        }
        Ok(Self { cpu, mem })
    }

    pub fn as_resources(&self) -> Resources {
        Resources::new().with(CPUS, self.cpu).with(MEM, self.mem)
    }
}
