/// Knobs for an editing session
#[derive(Clone, Debug)]
pub struct Settings {
    /// Check, when the edited instructions are taken out with
    /// [`finish`](crate::il::code::CodeCursor::finish), that every branch label tags exactly one
    /// instruction
    pub verify_labels: bool,

    /// Also send messages passed to
    /// [`report_failure`](crate::il::code::CodeCursor::report_failure) to the `log` facade
    /// (at `warn` level)
    pub log_reported_failures: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            verify_labels: true,
            log_reported_failures: true,
        }
    }
}
