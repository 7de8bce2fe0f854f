use crate::selftest::Accelerator;
use core::fmt::{Display, Formatter};
use device_tree::fdt::FdtError;
use thiserror_no_std::Error;

/// Errors while looking up devices and their configuration in the device tree
#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
pub enum DiscoveryError {
    #[error("Cannot find {0} in the device tree")]
    NotFound(&'static str),
    #[error("The node has no {0} property")]
    PropertyMissing(&'static str),
    #[error("The {0} property is shorter than one entry")]
    PropertyTooShort(&'static str),
    #[error("The {0} property holds an unsupported cell count")]
    InvalidCellCount(&'static str),
    #[error("Bus address {0:#x} is not covered by the ranges of its bus")]
    AddressNotFound(u64),
    #[error("The device tree is malformed: {0}")]
    Tree(#[from] FdtError),
}

/// Errors while relocating and editing the device tree for the next boot stage
#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
pub enum RelocationError {
    #[error("The device tree needs {required} bytes but only {capacity} bytes are reserved for it")]
    RelocationOverflow { required: usize, capacity: usize },
    #[error("A memory of {0:#x} bytes is too small to hold the relocated device tree")]
    MemoryTooSmall(u64),
    #[error("The relocation target {target:#x} overlaps the device tree passed by the loader")]
    OverlapsSource { target: u64 },
    #[error("Could not edit the relocated device tree: {0}")]
    TreeMutation(#[from] FdtError),
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),
}

#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
pub enum BootError {
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),
    #[error("{0}")]
    Relocation(#[from] RelocationError),
}

/// The steps of the boot sequence that can fail
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum BootStage {
    Console,
    PeripheralClock,
    Memory,
    HartCount,
    InterruptController,
    Relocation,
    Handoff,
    Accelerator(Accelerator),
    Gpio,
}

impl BootStage {
    /// Number identifying the stage in the failure report
    pub fn code(&self) -> usize {
        match self {
            BootStage::Console => 1,
            BootStage::PeripheralClock => 2,
            BootStage::Memory => 3,
            BootStage::HartCount => 4,
            BootStage::InterruptController => 5,
            BootStage::Relocation => 6,
            BootStage::Handoff => 7,
            BootStage::Accelerator(Accelerator::Klein) => 8,
            BootStage::Accelerator(Accelerator::Blake2s) => 9,
            BootStage::Accelerator(Accelerator::Chacha) => 10,
            BootStage::Gpio => 11,
        }
    }
}

impl Display for BootStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            BootStage::Console => f.write_str("console discovery"),
            BootStage::PeripheralClock => f.write_str("peripheral clock discovery"),
            BootStage::Memory => f.write_str("memory discovery"),
            BootStage::HartCount => f.write_str("hart discovery"),
            BootStage::InterruptController => f.write_str("interrupt controller discovery"),
            BootStage::Relocation => f.write_str("device tree relocation"),
            BootStage::Handoff => f.write_str("device tree preparation"),
            BootStage::Accelerator(accelerator) => {
                write!(f, "{} discovery", accelerator.name())
            }
            BootStage::Gpio => f.write_str("gpio discovery"),
        }
    }
}

/// A fatal error together with the step of the boot sequence it occurred in
#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
#[error("{stage} failed: {error}")]
pub struct BootFailure {
    pub stage: BootStage,
    pub error: BootError,
}

/// Attach the current [`BootStage`] to an error
pub trait AtStage<T> {
    fn at(self, stage: BootStage) -> Result<T, BootFailure>;
}

impl<T, E: Into<BootError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: BootStage) -> Result<T, BootFailure> {
        self.map_err(|error| BootFailure {
            stage,
            error: error.into(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::string::ToString;

    #[test]
    fn failure_names_stage_and_cause() {
        let failure: Result<(), _> =
            Err(DiscoveryError::PropertyTooShort("clock-frequency")).at(BootStage::PeripheralClock);
        let failure = failure.unwrap_err();
        assert_eq!(
            failure.error,
            BootError::Discovery(DiscoveryError::PropertyTooShort("clock-frequency"))
        );
        assert_eq!(
            failure.to_string(),
            "peripheral clock discovery failed: The clock-frequency property is shorter than one entry"
        );
    }

    #[test]
    fn every_stage_has_its_own_code() {
        let stages = [
            BootStage::Console,
            BootStage::PeripheralClock,
            BootStage::Memory,
            BootStage::HartCount,
            BootStage::InterruptController,
            BootStage::Relocation,
            BootStage::Handoff,
            BootStage::Accelerator(Accelerator::Klein),
            BootStage::Accelerator(Accelerator::Blake2s),
            BootStage::Accelerator(Accelerator::Chacha),
            BootStage::Gpio,
        ];
        let mut codes: std::vec::Vec<usize> = stages.iter().map(BootStage::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), stages.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn tree_errors_during_editing_are_mutation_errors() {
        let error: RelocationError = FdtError::Exists.into();
        assert_eq!(error, RelocationError::TreeMutation(FdtError::Exists));
    }
}
