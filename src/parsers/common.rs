use regex::Regex;
use tracing::trace;

/// A single named rewrite: every match of `pattern` is replaced by
/// `replacement` (which may reference capture groups as `${n}`).
#[derive(Debug)]
pub struct RewriteStage {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

impl RewriteStage {
    /// Stages are built from literals at startup, so a bad pattern is a
    /// programming error.
    pub fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        let pattern = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("invalid rewrite pattern for stage {name}: {e}"));
        Self {
            name,
            pattern,
            replacement,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, self.replacement).into_owned()
    }
}

/// Ordered list of rewrite stages applied left to right.
#[derive(Debug, Default)]
pub struct RewritePipeline {
    stages: Vec<RewriteStage>,
}

impl RewritePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        self.stages.push(RewriteStage::new(name, pattern, replacement));
        self
    }

    pub fn apply(&self, text: &str) -> String {
        self.stages.iter().fold(text.to_string(), |acc, stage| {
            let rewritten = stage.apply(&acc);
            if rewritten != acc {
                trace!("rewrite stage matched stage={}", stage.name());
            }
            rewritten
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RewritePipeline;

    #[test]
    fn stages_run_in_declaration_order() {
        let escape_first = RewritePipeline::new()
            .stage("escape_lt", "<", "&lt;")
            .stage("unwrap", r"<([^>]+)>", "${1}");
        let unwrap_first = RewritePipeline::new()
            .stage("unwrap", r"<([^>]+)>", "${1}")
            .stage("escape_lt", "<", "&lt;");

        assert_eq!(escape_first.apply("<a> < b"), "&lt;a> &lt; b");
        assert_eq!(unwrap_first.apply("<a> < b"), "a &lt; b");
        assert_eq!(
            RewritePipeline::new()
                .stage("bold", r"\*([^*]+)\*", "[${1}]")
                .stage("strip", r"\*", "")
                .apply("*x* *"),
            "[x] "
        );
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = RewritePipeline::new();
        assert_eq!(pipeline.apply("untouched *text*"), "untouched *text*");
    }

    #[test]
    fn later_stages_see_earlier_output() {
        let pipeline = RewritePipeline::new()
            .stage("one", "a", "b")
            .stage("two", "b", "c");
        assert_eq!(pipeline.apply("a"), "c");
    }
}
