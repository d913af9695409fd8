// mysql-resync/src/resync/transcript.rs
use super::steps::Step;

/// Human-readable record of a run. Lines are kept for inspection and, when
/// `echo` is set, printed as they are produced.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<String>,
    echo: bool,
}

impl Transcript {
    pub fn stdout() -> Self {
        Self {
            lines: Vec::new(),
            echo: true,
        }
    }

    /// Keeps lines in memory only.
    pub fn captured() -> Self {
        Self::default()
    }

    fn push(&mut self, line: String) {
        if self.echo {
            println!("{}", line);
        }
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn database_started(&mut self, database: &str, index: usize, total: usize) {
        self.push(format!(
            "\n🔄 Resynchronizing database: {} ({}/{})",
            database, index, total
        ));
    }

    pub fn step(&mut self, step: Step) {
        self.push(format!(
            "  [{:>2}/{}] {}",
            step.number(),
            Step::ALL.len(),
            step.label()
        ));
    }

    pub fn detail(&mut self, text: impl AsRef<str>) {
        for line in text.as_ref().lines().filter(|l| !l.trim().is_empty()) {
            self.push(format!("          {}", line.trim_end()));
        }
    }

    pub fn warn(&mut self, text: impl AsRef<str>) {
        self.push(format!("          ⚠️  {}", text.as_ref()));
    }

    pub fn database_finished(&mut self, database: &str, elapsed: chrono::Duration) {
        self.push(format!(
            "✓ Database {} resynchronized in {}s",
            database,
            elapsed.num_seconds()
        ));
    }

    pub fn database_failed(&mut self, database: &str, message: &str) {
        self.push(format!("❌ Resync of {} aborted: {}", database, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_line_format() {
        let mut t = Transcript::captured();
        t.step(Step::CheckLocalDisk);
        t.step(Step::Cleanup);
        assert_eq!(t.lines()[0], "  [ 1/13] Checking local disk space");
        assert_eq!(t.lines()[1], "  [13/13] Removing dump files");
    }

    #[test]
    fn test_detail_skips_blank_lines() {
        let mut t = Transcript::captured();
        t.detail("first\n\n  \nsecond\n");
        assert_eq!(t.lines().len(), 2);
        assert!(t.lines()[1].ends_with("second"));
    }

    #[test]
    fn test_database_summary_lines() {
        let mut t = Transcript::captured();
        t.database_started("orders", 1, 2);
        t.database_finished("orders", chrono::Duration::seconds(42));
        t.database_failed("inventory", "step 9 failed");
        assert!(t.lines()[0].ends_with("Resynchronizing database: orders (1/2)"));
        assert_eq!(t.lines()[1], "✓ Database orders resynchronized in 42s");
        assert!(t.lines()[2].contains("inventory") && t.lines()[2].contains("step 9 failed"));
    }
}
