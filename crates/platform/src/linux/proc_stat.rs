//! `/proc/stat` parsing.

use color_eyre::eyre::{eyre, Result};

use crate::types::{CpuTicks, SystemCounters, TickCounts};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcStat {
    pub ticks: CpuTicks,
    pub counters: SystemCounters,
}

/// Parses the contents of `/proc/stat`.
///
/// Busy time is everything except `idle` and `iowait`. `guest` columns are
/// already folded into `user` by the kernel and are not summed again.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat> {
    let mut system = None;
    let mut per_core = Vec::new();
    let mut counters = SystemCounters::default();

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(key) = fields.next() else {
            continue;
        };

        match key {
            "cpu" => system = Some(parse_cpu_fields(fields)),
            "ctxt" => counters.context_switches = parse_counter(fields),
            // First column is the total; the rest are per-IRQ.
            "intr" => counters.interrupts = parse_counter(fields),
            _ if key.starts_with("cpu") => {
                // Offline CPUs have no line; keep the rest at their own index.
                if let Ok(index) = key[3..].parse::<usize>() {
                    if per_core.len() <= index {
                        per_core.resize(index + 1, TickCounts::default());
                    }
                    per_core[index] = parse_cpu_fields(fields);
                }
            }
            _ => {}
        }
    }

    let system = system.ok_or_else(|| eyre!("/proc/stat has no aggregate cpu line"))?;
    Ok(ProcStat {
        ticks: CpuTicks { system, per_core },
        counters,
    })
}

fn parse_cpu_fields<'a>(fields: impl Iterator<Item = &'a str>) -> TickCounts {
    // user nice system idle iowait irq softirq steal
    let values: Vec<u64> = fields
        .take(8)
        .map(|v| v.parse().unwrap_or(0))
        .collect();

    let total: u64 = values.iter().sum();
    let idle = values.get(3).copied().unwrap_or(0) + values.get(4).copied().unwrap_or(0);
    TickCounts::new(total.saturating_sub(idle), total)
}

fn parse_counter<'a>(mut fields: impl Iterator<Item = &'a str>) -> u64 {
    fields.next().and_then(|v| v.parse().ok()).unwrap_or(0)
}
