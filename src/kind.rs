use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Instance;

/// The closed set of component kinds this compiler knows how to build.
///
/// Adding support for a new kind means adding a variant here and a planning
/// rule in [`crate::plan`]; there is no open-ended registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Switch,
    Sensor,
    BinarySensor,
    Light,
    Output,
    Clock,
    Select,
    Climate,
    Pid,
    Controller,
    Fridge,
}

/// What a reference site may require of a resolved handle.
///
/// Mirrors the declared type at the reference site; a handle satisfies a
/// reference only if its capability set contains the required capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Switch,
    Sensor,
    BinarySensor,
    Light,
    Output,
    Clock,
    Select,
    Climate,
    Pid,
    Controller,
    Fridge,
}

impl Kind {
    pub const ALL: &'static [Kind] = &[
        Kind::Switch,
        Kind::Sensor,
        Kind::BinarySensor,
        Kind::Light,
        Kind::Output,
        Kind::Clock,
        Kind::Select,
        Kind::Climate,
        Kind::Pid,
        Kind::Controller,
        Kind::Fridge,
    ];

    /// Stable lowercase name, also the prefix for generated identifiers.
    pub fn slug(self) -> &'static str {
        match self {
            Kind::Switch => "switch",
            Kind::Sensor => "sensor",
            Kind::BinarySensor => "binary_sensor",
            Kind::Light => "light",
            Kind::Output => "output",
            Kind::Clock => "clock",
            Kind::Select => "select",
            Kind::Climate => "climate",
            Kind::Pid => "pid",
            Kind::Controller => "controller",
            Kind::Fridge => "fridge",
        }
    }

    /// The capability a built instance of this kind provides.
    pub fn capability(self) -> Capability {
        match self {
            Kind::Switch => Capability::Switch,
            Kind::Sensor => Capability::Sensor,
            Kind::BinarySensor => Capability::BinarySensor,
            Kind::Light => Capability::Light,
            Kind::Output => Capability::Output,
            Kind::Clock => Capability::Clock,
            Kind::Select => Capability::Select,
            Kind::Climate => Capability::Climate,
            Kind::Pid => Capability::Pid,
            Kind::Controller => Capability::Controller,
            Kind::Fridge => Capability::Fridge,
        }
    }

    pub(crate) fn capabilities(self) -> BTreeSet<Capability> {
        BTreeSet::from([self.capability()])
    }

    /// Kinds this kind pulls in implicitly when they are absent from the
    /// configuration. "Ensure present", not a scheduling edge: a missing
    /// kind gets exactly one synthesized default instance.
    pub(crate) fn auto_load(self) -> &'static [Kind] {
        match self {
            Kind::Controller => &[Kind::Select],
            Kind::Fridge => &[Kind::Climate, Kind::Pid],
            Kind::Pid => &[Kind::Sensor],
            _ => &[],
        }
    }

    /// Kinds that must be declared (or auto-loaded) elsewhere in the
    /// configuration; never synthesized on this kind's behalf.
    pub(crate) fn requires(self) -> &'static [Kind] {
        match self {
            Kind::Controller => &[Kind::Clock],
            _ => &[],
        }
    }

    /// Kinds registered as a device platform on top of the component role.
    pub(crate) fn has_platform(self) -> bool {
        matches!(
            self,
            Kind::Switch
                | Kind::Sensor
                | Kind::BinarySensor
                | Kind::Light
                | Kind::Select
                | Kind::Climate
        )
    }

    /// A parameterless instance of this kind, used when auto-load has to
    /// synthesize one.
    pub(crate) fn default_instance(self) -> Instance {
        Instance::new(self)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
