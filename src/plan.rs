//! Per-kind construction programs.
//!
//! Planning turns one validated instance into a linear step program executed
//! by its generation task. Suspension points are program-counter positions,
//! so a task resumes exactly where it stopped without re-running earlier
//! steps. Planning itself never touches the registry; every reference is
//! recorded symbolically and resolved at run time.

use std::collections::BTreeMap;

use crate::config::{Instance, Value};
use crate::emit::{Literal, Role};
use crate::error::CompileError;
use crate::expand::IdentAllocator;
use crate::kind::{Capability, Kind};
use crate::registry::Ident;

/// Refresh period meaning "never", the maximum interval the target firmware
/// can represent (u32 milliseconds).
pub const UPDATE_INTERVAL_NEVER_MS: u64 = 4_294_967_295;

const DEFAULT_UPDATE_INTERVAL_MS: u64 = 60_000;

/// One step of a construction program.
#[derive(Debug, PartialEq)]
pub(crate) enum Step {
    /// Emit the construction of the owning instance.
    Construct { params: Vec<(String, Literal)> },
    /// Emit a literal field binding.
    Set { field: String, value: Literal },
    /// Resolve one identifier, then emit a reference field binding.
    Resolve {
        field: String,
        ident: Ident,
        expect: Capability,
    },
    /// Resolve an ordered reference list, then emit a single list-valued
    /// field binding.
    ResolveList {
        field: String,
        idents: Vec<Ident>,
        expect: Capability,
    },
    /// Build a sub-instance inline under a generated identifier and bind it
    /// immediately. Nested programs carry no resolve steps, so they cannot
    /// suspend.
    Nested {
        ident: Ident,
        kind: Kind,
        steps: Vec<Step>,
    },
    /// Emit a role registration for the owning instance.
    Register { role: Role },
}

/// Plans the instance at `index`, returning its step program and the
/// generated sub-instance identifiers that still need reserving.
pub(crate) fn plan_instance(
    instances: &[Instance],
    idents: &[Ident],
    alloc: &mut IdentAllocator,
    index: usize,
) -> Result<(Vec<Step>, Vec<(Ident, Kind)>), CompileError> {
    let instance = &instances[index];
    let who = format!("{} '{}'", instance.kind, idents[index]);
    let mut steps = Vec::new();
    let mut subs = Vec::new();

    match instance.kind {
        Kind::Switch => plan_switch(instance, &who, alloc, &mut steps, &mut subs)?,
        Kind::Light => plan_light(instance, &who, alloc, &mut steps, &mut subs)?,
        Kind::Controller => plan_controller(instances, idents, instance, &who, &mut steps)?,
        Kind::Fridge => plan_fridge(instance, &who, &mut steps)?,
        _ => plan_simple(instance, &mut steps),
    }

    Ok((steps, subs))
}

fn plan_switch(
    instance: &Instance,
    who: &str,
    alloc: &mut IdentAllocator,
    steps: &mut Vec<Step>,
    subs: &mut Vec<(Ident, Kind)>,
) -> Result<(), CompileError> {
    steps.push(Step::Construct {
        params: scalar_params(
            &instance.params,
            &["interlock_wait_time", "update_interval"],
        ),
    });
    steps.push(Step::Register {
        role: Role::Component,
    });
    steps.push(Step::Register {
        role: Role::Platform(Kind::Switch),
    });

    // The interlock wait time is only meaningful together with the list, so
    // both are bound only when the interlock key is present at all.
    if let Some(value) = instance.params.get("interlock") {
        let items = value
            .as_list()
            .ok_or_else(|| invalid(who, "'interlock' must be a list of references"))?;
        let mut refs = Vec::with_capacity(items.len());
        for item in items {
            let name = item
                .as_ref_name()
                .ok_or_else(|| invalid(who, "'interlock' entries must be references"))?;
            refs.push(Ident::new(name));
        }
        steps.push(Step::ResolveList {
            field: "interlock".into(),
            idents: refs,
            expect: Capability::Switch,
        });
        let wait = millis_or(&instance.params, "interlock_wait_time", 0, who)?;
        steps.push(Step::Set {
            field: "interlock_wait_time".into(),
            value: Literal::Millis(wait),
        });
    }

    plan_power(instance, "device_wattage", who, alloc, steps, subs)
}

fn plan_light(
    instance: &Instance,
    who: &str,
    alloc: &mut IdentAllocator,
    steps: &mut Vec<Step>,
    subs: &mut Vec<(Ident, Kind)>,
) -> Result<(), CompileError> {
    steps.push(Step::Construct {
        params: scalar_params(&instance.params, &["update_interval"]),
    });
    steps.push(Step::Register {
        role: Role::Component,
    });
    steps.push(Step::Register {
        role: Role::Platform(Kind::Light),
    });

    let output = req_ref(&instance.params, "output", who)?;
    steps.push(Step::Resolve {
        field: "output".into(),
        ident: output,
        expect: Capability::Output,
    });

    plan_power(instance, "light_wattage", who, alloc, steps, subs)
}

/// The optional power-measurement feed shared by switches and lights: a
/// nested sensor sub-instance plus its wattage and refresh settings. Without
/// the section the owner is still built, but its refresh period is pinned to
/// the "never" sentinel rather than left unset.
fn plan_power(
    instance: &Instance,
    wattage_field: &str,
    who: &str,
    alloc: &mut IdentAllocator,
    steps: &mut Vec<Step>,
    subs: &mut Vec<(Ident, Kind)>,
) -> Result<(), CompileError> {
    let section = match instance.params.get("power") {
        Some(value) => value
            .as_section()
            .ok_or_else(|| invalid(who, "'power' must be a section"))?,
        None => {
            steps.push(Step::Set {
                field: "update_interval".into(),
                value: Literal::Millis(UPDATE_INTERVAL_NEVER_MS),
            });
            return Ok(());
        }
    };

    let sub = alloc.generate(Kind::Sensor);
    steps.push(Step::Nested {
        ident: sub.clone(),
        kind: Kind::Sensor,
        steps: vec![
            Step::Construct {
                params: scalar_params(section, &[wattage_field, "update_interval"]),
            },
            Step::Register {
                role: Role::Component,
            },
            Step::Register {
                role: Role::Platform(Kind::Sensor),
            },
        ],
    });

    if let Some(value) = section.get(wattage_field) {
        let wattage = scalar(value)
            .ok_or_else(|| invalid(who, format!("'{wattage_field}' must be a scalar")))?;
        steps.push(Step::Set {
            field: wattage_field.into(),
            value: wattage,
        });
    }
    steps.push(Step::Resolve {
        field: "power_sensor".into(),
        ident: sub.clone(),
        expect: Capability::Sensor,
    });
    steps.push(Step::Set {
        field: "update_interval".into(),
        value: Literal::Millis(millis_or(
            section,
            "update_interval",
            DEFAULT_UPDATE_INTERVAL_MS,
            who,
        )?),
    });

    subs.push((sub, Kind::Sensor));
    Ok(())
}

fn plan_controller(
    instances: &[Instance],
    idents: &[Ident],
    instance: &Instance,
    who: &str,
    steps: &mut Vec<Step>,
) -> Result<(), CompileError> {
    steps.push(Step::Construct {
        params: scalar_params(&instance.params, &[]),
    });
    steps.push(Step::Register {
        role: Role::Component,
    });

    // An explicit clock reference wins; otherwise the single clock instance
    // of the configuration is used, and ambiguity is an error.
    let clock = match instance.params.get("clock") {
        Some(value) => value
            .as_ref_name()
            .map(Ident::new)
            .ok_or_else(|| invalid(who, "'clock' must be a reference"))?,
        None => implicit_unique(instances, idents, Kind::Clock, who)?,
    };
    steps.push(Step::Resolve {
        field: "time".into(),
        ident: clock,
        expect: Capability::Clock,
    });

    steps.push(Step::Resolve {
        field: "pump_switch".into(),
        ident: req_ref(&instance.params, "pump_switch", who)?,
        expect: Capability::Switch,
    });
    steps.push(Step::Resolve {
        field: "cleaner_switch".into(),
        ident: req_ref(&instance.params, "cleaner_switch", who)?,
        expect: Capability::Switch,
    });

    Ok(())
}

fn plan_fridge(
    instance: &Instance,
    who: &str,
    steps: &mut Vec<Step>,
) -> Result<(), CompileError> {
    steps.push(Step::Construct {
        params: scalar_params(&instance.params, &[]),
    });
    steps.push(Step::Register {
        role: Role::Component,
    });

    steps.push(Step::Resolve {
        field: "fridge_heat_output".into(),
        ident: req_ref(&instance.params, "heat_output", who)?,
        expect: Capability::Output,
    });

    let fridge = req_section(&instance.params, "fridge_control", who)?;
    steps.push(Step::Resolve {
        field: "fridge_sensor".into(),
        ident: req_ref(fridge, "sensor", who)?,
        expect: Capability::Sensor,
    });
    steps.push(Step::Set {
        field: "fridge_min_temp".into(),
        value: Literal::Float(req_f64(fridge, "min_temperature", who)?),
    });
    pid_literals(fridge, "fridge", who, steps)?;

    let freezer = req_section(&instance.params, "freezer_control", who)?;
    steps.push(Step::Resolve {
        field: "freezer_sensor".into(),
        ident: req_ref(freezer, "sensor", who)?,
        expect: Capability::Sensor,
    });
    steps.push(Step::Set {
        field: "freezer_max_temp".into(),
        value: Literal::Float(req_f64(freezer, "max_temperature", who)?),
    });
    steps.push(Step::Set {
        field: "cool_trigger_temp".into(),
        value: Literal::Float(req_f64(freezer, "cool_trigger_temperature", who)?),
    });
    pid_literals(freezer, "freezer", who, steps)?;

    Ok(())
}

fn pid_literals(
    section: &BTreeMap<String, Value>,
    prefix: &str,
    who: &str,
    steps: &mut Vec<Step>,
) -> Result<(), CompileError> {
    steps.push(Step::Set {
        field: format!("{prefix}_kp"),
        value: Literal::Float(req_f64(section, "kp", who)?),
    });
    steps.push(Step::Set {
        field: format!("{prefix}_ki"),
        value: Literal::Float(f64_or(section, "ki", 0.0, who)?),
    });
    steps.push(Step::Set {
        field: format!("{prefix}_kd"),
        value: Literal::Float(f64_or(section, "kd", 0.0, who)?),
    });
    steps.push(Step::Set {
        field: format!("{prefix}_min_integral"),
        value: Literal::Float(f64_or(section, "min_integral", -1.0, who)?),
    });
    steps.push(Step::Set {
        field: format!("{prefix}_max_integral"),
        value: Literal::Float(f64_or(section, "max_integral", 1.0, who)?),
    });
    Ok(())
}

fn plan_simple(instance: &Instance, steps: &mut Vec<Step>) {
    steps.push(Step::Construct {
        params: scalar_params(&instance.params, &[]),
    });
    steps.push(Step::Register {
        role: Role::Component,
    });
    if instance.kind.has_platform() {
        steps.push(Step::Register {
            role: Role::Platform(instance.kind),
        });
    }
}

fn scalar(value: &Value) -> Option<Literal> {
    match value {
        Value::Bool(v) => Some(Literal::Bool(*v)),
        Value::Int(v) => Some(Literal::Int(*v)),
        Value::Float(v) => Some(Literal::Float(*v)),
        Value::Str(v) => Some(Literal::Str(v.clone())),
        Value::Millis(v) => Some(Literal::Millis(*v)),
        Value::Ref(_) | Value::List(_) | Value::Section(_) => None,
    }
}

/// Scalar params in key order; references, lists and sections are handled by
/// the per-kind rules above and skipped here.
fn scalar_params(params: &BTreeMap<String, Value>, exclude: &[&str]) -> Vec<(String, Literal)> {
    params
        .iter()
        .filter(|(key, _)| !exclude.contains(&key.as_str()))
        .filter_map(|(key, value)| scalar(value).map(|lit| (key.clone(), lit)))
        .collect()
}

fn implicit_unique(
    instances: &[Instance],
    idents: &[Ident],
    kind: Kind,
    who: &str,
) -> Result<Ident, CompileError> {
    let mut found = instances
        .iter()
        .zip(idents)
        .filter(|(instance, _)| instance.kind == kind)
        .map(|(_, ident)| ident);

    match (found.next(), found.next()) {
        (Some(ident), None) => Ok(ident.clone()),
        (None, _) => Err(CompileError::MissingDependency {
            kind,
            required_by: who.to_string(),
        }),
        (Some(_), Some(_)) => Err(invalid(
            who,
            format!("more than one {kind} instance, an explicit reference is required"),
        )),
    }
}

fn req_ref(
    params: &BTreeMap<String, Value>,
    key: &str,
    who: &str,
) -> Result<Ident, CompileError> {
    match params.get(key) {
        Some(value) => value
            .as_ref_name()
            .map(Ident::new)
            .ok_or_else(|| invalid(who, format!("'{key}' must be a reference"))),
        None => Err(invalid(who, format!("missing required reference '{key}'"))),
    }
}

fn req_section<'a>(
    params: &'a BTreeMap<String, Value>,
    key: &str,
    who: &str,
) -> Result<&'a BTreeMap<String, Value>, CompileError> {
    match params.get(key) {
        Some(value) => value
            .as_section()
            .ok_or_else(|| invalid(who, format!("'{key}' must be a section"))),
        None => Err(invalid(who, format!("missing required section '{key}'"))),
    }
}

fn req_f64(
    section: &BTreeMap<String, Value>,
    key: &str,
    who: &str,
) -> Result<f64, CompileError> {
    match section.get(key) {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| invalid(who, format!("'{key}' must be a number"))),
        None => Err(invalid(who, format!("missing required value '{key}'"))),
    }
}

fn f64_or(
    section: &BTreeMap<String, Value>,
    key: &str,
    default: f64,
    who: &str,
) -> Result<f64, CompileError> {
    match section.get(key) {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| invalid(who, format!("'{key}' must be a number"))),
        None => Ok(default),
    }
}

fn millis_or(
    section: &BTreeMap<String, Value>,
    key: &str,
    default: u64,
    who: &str,
) -> Result<u64, CompileError> {
    match section.get(key) {
        Some(value) => value
            .as_millis()
            .ok_or_else(|| invalid(who, format!("'{key}' must be a time period"))),
        None => Ok(default),
    }
}

fn invalid(who: &str, message: impl Into<String>) -> CompileError {
    CompileError::Validation {
        instance: who.to_string(),
        source: anyhow::anyhow!(message.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_one(instance: Instance) -> (Vec<Step>, Vec<(Ident, Kind)>) {
        try_plan_one(instance).unwrap()
    }

    fn try_plan_one(
        instance: Instance,
    ) -> Result<(Vec<Step>, Vec<(Ident, Kind)>), CompileError> {
        let instances = vec![instance];
        let idents = vec![Ident::new("it")];
        let mut alloc = IdentAllocator::new();
        plan_instance(&instances, &idents, &mut alloc, 0)
    }

    #[test]
    fn test_switch_without_power_pins_never_sentinel() {
        let (steps, subs) = plan_one(
            Instance::new(Kind::Switch)
                .with_id("pump")
                .with("pin", Value::Int(4)),
        );

        assert!(subs.is_empty());
        let sentinel = steps
            .iter()
            .filter(|step| {
                matches!(
                    step,
                    Step::Set { field, value: Literal::Millis(UPDATE_INTERVAL_NEVER_MS) }
                        if field == "update_interval"
                )
            })
            .count();
        assert_eq!(sentinel, 1);
    }

    #[test]
    fn test_switch_power_builds_nested_sensor() {
        let power = Value::Section(
            [
                ("device_wattage".to_string(), Value::Float(9.5)),
                ("update_interval".to_string(), Value::Millis(30_000)),
            ]
            .into(),
        );
        let (steps, subs) = plan_one(
            Instance::new(Kind::Switch)
                .with_id("pump")
                .with("pin", Value::Int(4))
                .with("power", power),
        );

        assert_eq!(subs, vec![(Ident::new("sensor"), Kind::Sensor)]);
        assert!(steps.iter().any(|s| matches!(s, Step::Nested { .. })));
        assert!(steps.iter().any(|s| matches!(
            s,
            Step::Set { field, value: Literal::Millis(30_000) } if field == "update_interval"
        )));
        // The sentinel never shows up alongside a configured feed.
        assert!(!steps.iter().any(|s| matches!(
            s,
            Step::Set { value: Literal::Millis(UPDATE_INTERVAL_NEVER_MS), .. }
        )));
    }

    #[test]
    fn test_switch_interlock_preserves_order() {
        let (steps, _) = plan_one(
            Instance::new(Kind::Switch)
                .with_id("relay1")
                .with(
                    "interlock",
                    Value::List(vec![
                        Value::Ref("relay3".into()),
                        Value::Ref("relay2".into()),
                    ]),
                ),
        );

        let idents = steps
            .iter()
            .find_map(|s| match s {
                Step::ResolveList { idents, .. } => Some(idents.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(idents, vec![Ident::new("relay3"), Ident::new("relay2")]);
    }

    #[test]
    fn test_light_requires_output() {
        let err = try_plan_one(Instance::new(Kind::Light).with_id("lamp")).unwrap_err();
        assert!(matches!(err, CompileError::Validation { .. }));
        assert!(err.to_string().contains("output"));
    }

    #[test]
    fn test_simple_kind_registers_platform() {
        let (steps, _) = plan_one(Instance::new(Kind::Sensor).with_id("temp"));
        assert_eq!(
            steps,
            vec![
                Step::Construct { params: vec![] },
                Step::Register {
                    role: Role::Component
                },
                Step::Register {
                    role: Role::Platform(Kind::Sensor)
                },
            ]
        );
    }

    #[test]
    fn test_controller_ambiguous_clock() {
        let instances = vec![
            Instance::new(Kind::Clock).with_id("rtc_a"),
            Instance::new(Kind::Clock).with_id("rtc_b"),
            Instance::new(Kind::Controller)
                .with_id("pool")
                .with("pump_switch", Value::Ref("pump".into()))
                .with("cleaner_switch", Value::Ref("pump".into())),
        ];
        let idents = vec![Ident::new("rtc_a"), Ident::new("rtc_b"), Ident::new("pool")];
        let mut alloc = IdentAllocator::new();

        let err = plan_instance(&instances, &idents, &mut alloc, 2).unwrap_err();
        assert!(matches!(err, CompileError::Validation { .. }));
    }
}
