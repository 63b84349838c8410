use std::fmt::Write as _;

use stampede_core::{RunSummary, StepStats};

use super::format::{format_elapsed, format_micros, format_rate};

pub(crate) fn render(summary: &RunSummary) -> String {
    let mut out = String::new();

    writeln!(out, "summary: scenario `{}`", summary.scenario).ok();

    write!(
        out,
        "  users: started {} completed {} aborted {}",
        summary.users_started, summary.users_completed, summary.users_aborted
    )
    .ok();
    if !summary.aborts.is_empty() {
        let reasons = summary
            .aborts
            .iter()
            .map(|(reason, n)| format!("{reason}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        write!(out, " ({reasons})").ok();
    }
    out.push('\n');
    writeln!(out, "  peak active users: {}", summary.peak_active_users).ok();

    write!(out, "  elapsed: {}", format_elapsed(summary.elapsed)).ok();
    if summary.stopped_early {
        out.push_str(" (stopped early)");
    }
    out.push('\n');

    let total = &summary.metrics.total;
    render_stats(&mut out, "  ", total);

    let secs = summary.elapsed.as_secs_f64().max(1e-9);
    writeln!(
        out,
        "  rates: rps={}",
        format_rate(total.requests as f64 / secs)
    )
    .ok();

    if summary.metrics.steps.is_empty() {
        return out;
    }

    out.push_str("\nsteps\n");
    for (name, stats) in &summary.metrics.steps {
        writeln!(out, "  {name}").ok();
        render_stats(&mut out, "    ", stats);
    }

    out
}

fn render_stats(out: &mut String, indent: &str, s: &StepStats) {
    write!(out, "{indent}requests: {}", s.requests).ok();
    let classes = s
        .status_classes
        .iter()
        .map(|(class, n)| format!("{class}={n}"))
        .chain(
            s.transport_errors
                .iter()
                .map(|(kind, n)| format!("{kind}={n}")),
        )
        .collect::<Vec<_>>();
    if !classes.is_empty() {
        write!(out, " ({})", classes.join(" ")).ok();
    }
    out.push('\n');

    if s.skipped > 0 {
        writeln!(out, "{indent}skipped: {}", s.skipped).ok();
    }
    if s.extraction_warnings > 0 {
        writeln!(out, "{indent}extraction warnings: {}", s.extraction_warnings).ok();
    }

    let h = &s.latency;
    if h.count == 0 {
        writeln!(out, "{indent}latency: n/a").ok();
        return;
    }
    writeln!(
        out,
        "{indent}latency = p50={} p90={} p99={} mean={} max={} (n={})",
        format_micros(h.p50),
        format_micros(h.p90),
        format_micros(h.p99),
        format_micros(h.mean),
        format_micros(h.max),
        h.count
    )
    .ok();
}
