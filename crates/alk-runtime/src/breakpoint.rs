use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::demux::OutputBlock;

pub const CLEAR_COMMAND: &str = "clear";

const REJECTION_WORDS: [&str; 3] = ["error", "invalid", "cannot"];

/// When a breakpoint counts as verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyPolicy {
    /// Verified as soon as it is set.
    #[default]
    Optimistic,
    /// Verified from the interpreter's answer to `break`.
    BackendResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Pending,
    Verified,
    Rejected,
}

impl Verification {
    /// Reads the answer to a `break` command.
    pub fn from_response(block: &OutputBlock) -> Self {
        let rejected = block.lines.iter().any(|line| {
            let line = line.to_lowercase();
            REJECTION_WORDS.iter().any(|word| line.contains(word))
        });

        if rejected {
            Verification::Rejected
        } else {
            Verification::Verified
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u64,
    /// One-based source line.
    pub line: usize,
    pub verification: Verification,
}

impl Breakpoint {
    pub fn is_verified(&self) -> bool {
        self.verification == Verification::Verified
    }
}

pub fn break_command(line: usize) -> String {
    format!("break {line}")
}

/// Breakpoints per file, in insertion order. Ids are never reused.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    next_id: u64,
    files: HashMap<PathBuf, Vec<Breakpoint>>,
}

impl BreakpointRegistry {
    pub fn allocate(&mut self, file: &Path, line: usize) -> Breakpoint {
        self.next_id += 1;
        let breakpoint = Breakpoint {
            id: self.next_id,
            line,
            verification: Verification::Pending,
        };
        self.files
            .entry(file.to_path_buf())
            .or_default()
            .push(breakpoint.clone());
        breakpoint
    }

    /// Returns the updated breakpoint when the state actually changed.
    pub fn update(
        &mut self,
        file: &Path,
        id: u64,
        verification: Verification,
    ) -> Option<Breakpoint> {
        let breakpoint = self
            .files
            .get_mut(file)?
            .iter_mut()
            .find(|breakpoint| breakpoint.id == id)?;

        if breakpoint.verification == verification {
            return None;
        }

        breakpoint.verification = verification;
        Some(breakpoint.clone())
    }

    pub fn remove_file(&mut self, file: &Path) -> Vec<Breakpoint> {
        self.files.remove(file).unwrap_or_default()
    }

    pub fn breakpoints(&self, file: &Path) -> Vec<Breakpoint> {
        self.files.get(file).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_ids_are_unique_across_files() {
        let mut registry = BreakpointRegistry::default();
        let a = registry.allocate(Path::new("a.alk"), 3);
        let b = registry.allocate(Path::new("b.alk"), 3);
        registry.remove_file(Path::new("a.alk"));
        let c = registry.allocate(Path::new("a.alk"), 4);

        assert_eq!((a.id, b.id, c.id), (1, 2, 3));
        assert_eq!(registry.breakpoints(Path::new("a.alk")), vec![c]);
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut registry = BreakpointRegistry::default();
        for line in [9, 2, 5] {
            registry.allocate(Path::new("a.alk"), line);
        }

        let lines: Vec<usize> = registry
            .breakpoints(Path::new("a.alk"))
            .iter()
            .map(|bp| bp.line)
            .collect();
        assert_eq!(lines, vec![9, 2, 5]);
    }

    #[test]
    fn test_update_reports_changes_only() {
        let mut registry = BreakpointRegistry::default();
        let bp = registry.allocate(Path::new("a.alk"), 1);

        let updated = registry.update(Path::new("a.alk"), bp.id, Verification::Verified);
        assert!(updated.is_some_and(|bp| bp.is_verified()));
        assert_eq!(
            registry.update(Path::new("a.alk"), bp.id, Verification::Verified),
            None
        );
        assert_eq!(
            registry.update(Path::new("b.alk"), bp.id, Verification::Rejected),
            None
        );
    }

    #[rstest]
    #[case::accepted(&["Breakpoint set at line 3."], Verification::Verified)]
    #[case::empty(&[], Verification::Verified)]
    #[case::error(&["Error: line 99 is out of range"], Verification::Rejected)]
    #[case::cannot(&["Cannot place a breakpoint here"], Verification::Rejected)]
    fn test_verification_from_response(#[case] lines: &[&str], #[case] expected: Verification) {
        let block = OutputBlock {
            name: "break 3".to_string(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        };
        assert_eq!(Verification::from_response(&block), expected);
    }
}
