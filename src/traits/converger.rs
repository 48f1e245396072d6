use crate::engine::{ConvergeMode, ConvergePass, ConvergeReport};

/// A convergence strategy. Runs synchronously inside commit, while the
/// module's writer lane is held.
pub trait Converger: Send + Sync {
    fn converge(&self, pass: &mut ConvergePass<'_>) -> ConvergeReport;

    fn mode(&self) -> ConvergeMode;

    fn name(&self) -> &'static str;
}
