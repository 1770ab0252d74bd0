//! Program Variants
//!
//! A [`ProgramVariant`] is one compiled program for exactly one cache key. The
//! variant keeps its generated sources for diagnostics, the driver handle and
//! a usage count maintained by [`ProgramCache`](super::cache::ProgramCache).

use slotmap::new_key_type;

use crate::renderer::driver::ProgramHandle;
use crate::renderer::pipeline::parameters::ProgramParameters;

new_key_type! {
    /// Stable identity of a cached program variant.
    pub struct ProgramId;
}

/// Readiness of a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramState {
    /// Compile issued, not yet confirmed by the driver.
    Pending,
    Ready,
    /// Assembly, compile or link failed. The variant stays cached so the same
    /// key is not rebuilt every frame, but it is never drawn with.
    Invalid(String),
}

#[derive(Debug)]
pub struct ProgramVariant {
    pub(crate) id: ProgramId,
    pub(crate) key: String,
    pub(crate) label: String,
    pub(crate) handle: Option<ProgramHandle>,
    pub(crate) vertex: String,
    pub(crate) fragment: String,
    pub(crate) state: ProgramState,
    pub(crate) usage: u32,
    pub(crate) parameters: ProgramParameters,
}

impl ProgramVariant {
    #[must_use]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Driver handle; `None` when assembly failed before compilation.
    #[must_use]
    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    #[must_use]
    pub fn vertex_source(&self) -> &str {
        &self.vertex
    }

    #[must_use]
    pub fn fragment_source(&self) -> &str {
        &self.fragment
    }

    #[must_use]
    pub fn state(&self) -> &ProgramState {
        &self.state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ProgramState::Ready
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self.state, ProgramState::Invalid(_))
    }

    /// Number of material slots referencing this variant.
    #[must_use]
    pub fn usage(&self) -> u32 {
        self.usage
    }

    #[must_use]
    pub fn parameters(&self) -> &ProgramParameters {
        &self.parameters
    }
}

/// Extracts the 1-based line number from a driver log entry such as
/// `ERROR: 0:12: 'foo' : undeclared identifier`.
#[must_use]
pub fn error_line(log: &str) -> Option<usize> {
    log.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix("ERROR:")?.trim_start();
        let (_, rest) = rest.split_once(':')?;
        let (number, _) = rest.split_once(':')?;
        number.trim().parse().ok()
    })
}

/// Numbered source lines within `radius` of `line`, with the line itself
/// marked by `>`.
#[must_use]
pub fn source_context(source: &str, line: usize, radius: usize) -> String {
    let first = line.saturating_sub(radius).max(1);
    let last = line + radius;
    source
        .lines()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .filter(|(number, _)| (first..=last).contains(number))
        .map(|(number, text)| {
            let marker = if number == line { '>' } else { ' ' };
            format!("{marker}{number:>5}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
