use crate::error::{TrainingError, TrainingResult};
use std::io::{BufRead, Write};

/// Terminal outcome of the startup fresh-vs-resume decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeDecision {
    FreshStart,
    ResumeFrom(String),
}

/// Interactive prompt state machine: `Prompting -> {FreshStart, ResumeFrom}`.
///
/// Presents the checkpoint list, then loops re-prompting until the answer
/// is exactly the literal token `start` or exactly one of the listed
/// names. The wait is intentionally unbounded; the I/O channel is injected
/// so the decision logic is independent of stdin/stdout.
pub fn decide<R: BufRead, W: Write>(
    checkpoints: &[String],
    input: &mut R,
    output: &mut W,
) -> TrainingResult<ResumeDecision> {
    if checkpoints.is_empty() {
        writeln!(output, "No checkpoints found")?;
        return Ok(ResumeDecision::FreshStart);
    }

    writeln!(output, "Found checkpoints:")?;
    for name in checkpoints {
        writeln!(output, "    {name}")?;
    }

    loop {
        write!(
            output,
            "Start training from scratch (start) or resume training from a previous checkpoint (choose one of the above): "
        )?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(TrainingError::Configuration(
                "input closed before a resume choice was made".to_string(),
            ));
        }
        let answer = line.trim();

        if answer == "start" {
            return Ok(ResumeDecision::FreshStart);
        }
        if checkpoints.iter().any(|name| name == answer) {
            return Ok(ResumeDecision::ResumeFrom(answer.to_string()));
        }
        writeln!(
            output,
            "Answer should be 'start' or one of the following checkpoints: {checkpoints:?}"
        )?;
    }
}

/// Non-interactive channel for the same decision, driven by CLI flags.
pub fn decide_from_flags(
    checkpoints: &[String],
    start: bool,
    resume: Option<&str>,
) -> TrainingResult<ResumeDecision> {
    if start {
        return Ok(ResumeDecision::FreshStart);
    }
    match resume {
        Some(name) if checkpoints.iter().any(|n| n == name) => {
            Ok(ResumeDecision::ResumeFrom(name.to_string()))
        }
        Some(name) => Err(TrainingError::Configuration(format!(
            "--resume {name} does not match any checkpoint; available: {checkpoints:?}"
        ))),
        None => Ok(ResumeDecision::FreshStart),
    }
}
