//! `ascii` role: frame text in an ASCII box.

use crate::domain::envelope::Envelope;
use crate::domain::error::ComputeError;
use crate::ports::outbound::Compute;
use async_trait::async_trait;

/// Longest line rendered before wrapping.
const MAX_WIDTH: usize = 72;

pub struct AsciiCompute;

#[async_trait]
impl Compute for AsciiCompute {
    fn name(&self) -> &'static str {
        "ascii"
    }

    async fn compute(&self, request: &Envelope) -> Result<String, ComputeError> {
        render_banner(&request.payload)
    }
}

/// Render `text` as a boxed banner.
///
/// Non-ASCII characters become `?`, tabs become a space, other control
/// characters are dropped. Lines longer than the box are wrapped.
pub fn render_banner(text: &str) -> Result<String, ComputeError> {
    let lines: Vec<String> = text
        .lines()
        .map(transliterate)
        .flat_map(|line| wrap(&line))
        .collect();

    if lines.iter().all(|l| l.trim().is_empty()) {
        return Err(ComputeError::InvalidInput("nothing to render".into()));
    }

    let width = lines.iter().map(String::len).max().unwrap_or(0);
    let border = format!("+{}+", "-".repeat(width + 2));

    let mut out = String::with_capacity((width + 4) * (lines.len() + 2));
    out.push_str(&border);
    out.push('\n');
    for line in &lines {
        out.push_str(&format!("| {:<width$} |\n", line, width = width));
    }
    out.push_str(&border);
    Ok(out)
}

fn transliterate(line: &str) -> String {
    line.chars()
        .filter_map(|c| match c {
            '\t' => Some(' '),
            c if c.is_ascii_control() => None,
            c if c.is_ascii() => Some(c),
            _ => Some('?'),
        })
        .collect()
}

fn wrap(line: &str) -> Vec<String> {
    if line.len() <= MAX_WIDTH {
        return vec![line.to_string()];
    }
    // transliterated lines are pure ASCII, byte chunks are char chunks
    line.as_bytes()
        .chunks(MAX_WIDTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}
