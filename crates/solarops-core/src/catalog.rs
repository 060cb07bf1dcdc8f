// Known panel fault types and their standard remediation

use crate::fault::normalize_fault_type;

/// A well-known fault type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownFault {
    pub name: &'static str,
    pub recommended_action: &'static str,
    /// Alternative spellings sources use for the same fault
    aliases: &'static [&'static str],
}

pub const KNOWN_FAULTS: &[KnownFault] = &[
    KnownFault {
        name: "Hotspot",
        recommended_action: "Run a thermal inspection of the affected cells and replace the panel if the hotspot persists",
        aliases: &["hot spot", "thermal hotspot"],
    },
    KnownFault {
        name: "Dirty Panel",
        recommended_action: "Schedule cleaning of the row and re-check output after cleaning",
        aliases: &["dust accumulation", "soiling", "dust", "bird droppings"],
    },
    KnownFault {
        name: "Cracked",
        recommended_action: "Inspect the glass and cells for micro-cracks and replace the panel",
        aliases: &["crack", "micro crack", "physical damage"],
    },
    KnownFault {
        name: "Shading",
        recommended_action: "Identify and remove the shading source or trim surrounding vegetation",
        aliases: &["partial shading", "shadow"],
    },
    KnownFault {
        name: "Inverter Fault",
        recommended_action: "Check the row inverter logs and restart or replace the inverter",
        aliases: &["inverter", "inverter failure"],
    },
    KnownFault {
        name: "Connector Issue",
        recommended_action: "Inspect and reseat MC4 connectors along the string",
        aliases: &["connector", "loose connector"],
    },
    KnownFault {
        name: "Wiring Fault",
        recommended_action: "Trace the string wiring for damage and test insulation resistance",
        aliases: &["wiring", "cable damage"],
    },
    KnownFault {
        name: "Degradation",
        recommended_action: "Measure the I-V curve and plan replacement if output is below warranty",
        aliases: &["pid", "delamination"],
    },
    KnownFault {
        name: "Arc Fault",
        recommended_action: "Isolate the string immediately and inspect for arcing damage",
        aliases: &["arc", "arcs", "arcing"],
    },
    KnownFault {
        name: "Obstruction",
        recommended_action: "Remove debris or foreign objects covering the panels",
        aliases: &["debris", "foreign object"],
    },
];

pub const GENERIC_ACTION: &str = "Dispatch a technician to inspect the row and diagnose the anomaly";

/// Look up a known fault by name or alias
pub fn lookup(fault_type: &str) -> Option<&'static KnownFault> {
    let needle = normalize_fault_type(fault_type);
    if needle.is_empty() {
        return None;
    }
    KNOWN_FAULTS.iter().find(|known| {
        normalize_fault_type(known.name) == needle || known.aliases.iter().any(|a| *a == needle)
    })
}

pub fn recommended_action(fault_type: &str) -> &'static str {
    lookup(fault_type)
        .map(|known| known.recommended_action)
        .unwrap_or(GENERIC_ACTION)
}
