// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::{AutoConverger, ConvergeMode, DirtyConverger, FullConverger};
use crate::traits::Converger;

/// Factory for creating convergers from configuration
pub struct ConvergerFactory;

impl ConvergerFactory {
    /// Create a converger for the configured mode
    pub fn from_mode(mode: ConvergeMode) -> Box<dyn Converger> {
        match mode {
            ConvergeMode::Full => Box::new(FullConverger::new()),
            ConvergeMode::Dirty => Box::new(DirtyConverger::new()),
            ConvergeMode::Auto => Box::new(AutoConverger::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_maps_modes() {
        assert_eq!(ConvergerFactory::from_mode(ConvergeMode::Full).name(), "full");
        assert_eq!(ConvergerFactory::from_mode(ConvergeMode::Dirty).name(), "dirty");
        assert_eq!(ConvergerFactory::from_mode(ConvergeMode::Auto).mode(), ConvergeMode::Auto);
    }
}
