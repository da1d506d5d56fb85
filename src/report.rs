//! Markdown report assembled from step results.

use crate::normalize::truncate_refresh_noise;
use crate::pipeline::{FMT_STEP, INIT_STEP, VALIDATE_STEP, Workflow};
use crate::sequencer::{RunOutcome, SequenceReport, StepResult, StepState};

/// Upper bound on the characters in a rendered report. Forges reject
/// comments longer than 65 536 characters.
pub const MAX_REPORT_CHARS: usize = 65_000;

/// Notice appended to captured text that did not fit in the report.
pub const TRUNCATION_NOTICE: &str = "... output truncated, see the pipeline log for the full text";

/// Who and what triggered the run, for the report footer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Attribution {
    /// Account that triggered the run.
    pub actor: Option<String>,
    /// Trigger event name, such as `pull_request`.
    pub event_name: Option<String>,
    /// Run identifier assigned by the pipeline host.
    pub run_id: Option<String>,
    /// Infrastructure directory relative to the checkout root.
    pub working_dir: String,
    /// Pipeline definition name.
    pub workflow: Option<String>,
}

/// Immutable rendered report text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RenderedReport {
    body: String,
}

impl RenderedReport {
    /// Wraps already rendered text.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// Returns the markdown body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Caps `text` at `limit` characters. When anything is dropped the kept
/// prefix is followed by [`TRUNCATION_NOTICE`], within the same limit.
#[must_use]
pub fn cap_output(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let notice = format!("\n{TRUNCATION_NOTICE}");
    let notice_chars = notice.chars().count();
    if limit < notice_chars {
        return text.chars().take(limit).collect();
    }
    let kept: String = text.chars().take(limit - notice_chars).collect();
    let mut capped = kept.trim_end().to_owned();
    capped.push_str(&notice);
    capped
}

/// Piece of the report body. Captured text is only sized once the fixed
/// text around it is known.
enum Section {
    Line(String),
    Details { summary: String, text: String },
}

/// Renders the comment for one run. The body never exceeds
/// [`MAX_REPORT_CHARS`] for attribution values of ordinary length.
#[must_use]
pub fn render_report(
    workflow: Workflow,
    sequence: &SequenceReport,
    outcome: RunOutcome,
    attribution: &Attribution,
) -> RenderedReport {
    let mut sections = Vec::new();

    if workflow == Workflow::Plan {
        let fmt = sequence.step(FMT_STEP);
        sections.push(heading("Format and Style", fmt));
        if let Some(result) = fmt.filter(|result| result.failed()) {
            sections.push(details("Unformatted files", &captured_text(result)));
        }
    }

    sections.push(heading("Initialization", sequence.step(INIT_STEP)));

    if workflow == Workflow::Plan {
        let validate = sequence.step(VALIDATE_STEP);
        sections.push(heading("Validation", validate));
        if let Some(result) = validate.filter(|result| result.failed()) {
            sections.push(details("Validation output", &captured_text(result)));
        }
    }

    let main = sequence.step(workflow.main_step());
    let title = match workflow {
        Workflow::Plan => "Plan",
        Workflow::Apply => "Apply",
    };
    sections.push(heading(title, main));
    let text = match main {
        Some(result) if result.state != StepState::Skipped => {
            truncate_refresh_noise(&captured_text(result)).into_owned()
        }
        _ => format!("The {workflow} step did not run."),
    };
    sections.push(details(&format!("Show {workflow}"), &text));

    sections.push(Section::Line(format!(
        "**Run outcome:** `{}`\n\n",
        outcome.as_str()
    )));
    sections.push(Section::Line(footer(attribution)));

    RenderedReport {
        body: assemble(&sections),
    }
}

fn assemble(sections: &[Section]) -> String {
    let fixed: usize = sections
        .iter()
        .map(|section| match section {
            Section::Line(line) => line.chars().count(),
            Section::Details { summary, text } => {
                details_block(summary, "", &fence_for(text)).chars().count()
            }
        })
        .sum();
    let lengths: Vec<usize> = sections
        .iter()
        .filter_map(|section| match section {
            Section::Details { text, .. } => Some(text.chars().count()),
            Section::Line(_) => None,
        })
        .collect();
    let mut limits = share_budget(&lengths, MAX_REPORT_CHARS.saturating_sub(fixed)).into_iter();

    let mut body = String::new();
    for section in sections {
        match section {
            Section::Line(line) => body.push_str(line),
            Section::Details { summary, text } => {
                let limit = limits.next().unwrap_or_default();
                body.push_str(&details_block(summary, &cap_output(text, limit), &fence_for(text)));
            }
        }
    }
    body
}

/// Splits `budget` across blocks of the given lengths. Blocks shorter than
/// an even share keep their full length and pass the surplus on.
fn share_budget(lengths: &[usize], budget: usize) -> Vec<usize> {
    let mut order: Vec<(usize, usize)> = lengths.iter().copied().enumerate().collect();
    order.sort_by_key(|&(_, length)| length);

    let mut remaining = budget;
    let mut pending = order.len();
    let mut shares: Vec<(usize, usize)> = Vec::with_capacity(order.len());
    for (index, length) in order {
        let share = remaining.checked_div(pending).unwrap_or_default().min(length);
        remaining -= share;
        pending -= 1;
        shares.push((index, share));
    }
    shares.sort_by_key(|&(index, _)| index);
    shares.into_iter().map(|(_, share)| share).collect()
}

fn captured_text(result: &StepResult) -> String {
    match (result.stdout.trim_end().is_empty(), result.stderr.trim_end().is_empty()) {
        (_, true) => result.stdout.clone(),
        (true, false) => result.stderr.clone(),
        (false, false) => format!("{}\n{}", result.stdout.trim_end(), result.stderr),
    }
}

fn heading(title: &str, result: Option<&StepResult>) -> Section {
    let state = result.map_or(StepState::Skipped, |step| step.state);
    Section::Line(format!("#### {title} `{state}`\n"))
}

fn details(summary: &str, text: &str) -> Section {
    Section::Details {
        summary: summary.to_owned(),
        text: text.trim_end().to_owned(),
    }
}

fn details_block(summary: &str, text: &str, fence: &str) -> String {
    format!(
        "<details><summary>{summary}</summary>\n\n{fence}\n{text}\n{fence}\n\n</details>\n\n"
    )
}

/// Returns a backtick fence longer than any backtick run inside `text`.
fn fence_for(text: &str) -> String {
    let mut longest = 0_usize;
    let mut current = 0_usize;
    for ch in text.chars() {
        if ch == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    "`".repeat(longest.max(2) + 1)
}

fn footer(attribution: &Attribution) -> String {
    let or_unknown = |value: Option<&String>| value.map_or("unknown", String::as_str).to_owned();
    format!(
        "*Pusher: @{}, Action: `{}`, Working Directory: `{}`, Workflow: `{}`, Run: `{}`*",
        or_unknown(attribution.actor.as_ref()),
        or_unknown(attribution.event_name.as_ref()),
        attribution.working_dir,
        or_unknown(attribution.workflow.as_ref()),
        or_unknown(attribution.run_id.as_ref()),
    )
}
