//! Planner error kinds.

/// A result type returning planner errors.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for planner operations.
///
/// Components surface errors to the grid orchestrator, which aborts the
/// run; warning-level conditions (tapered vias, skipped channels) are
/// logged instead of raised.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A shape insertion would overlap a shape of another net.
    #[error("short between {net} and {other} on {layer} at {rect}")]
    Short {
        /// The net of the inserted shape.
        net: String,
        /// The net of the existing shape.
        other: String,
        /// The layer name.
        layer: String,
        /// The offending rectangle.
        rect: String,
    },
    /// Two same-net shapes overlap without sharing a full edge.
    #[error("cannot merge misaligned shapes on {layer}: {rect} and {other}")]
    UnalignedMerge {
        /// The layer name.
        layer: String,
        /// The inserted rectangle.
        rect: String,
        /// The existing rectangle.
        other: String,
    },
    /// A width, spacing, area, min-cut, or enclosure rule is violated.
    #[error("rule violation: {0}")]
    RuleViolation(String),
    /// Channel repair exhausted its search space.
    #[error("unable to repair channel: {0}")]
    RepairInfeasible(String),
    /// A via stack would need a non-preferred tapered via.
    #[error("tapered via required between {lower} and {upper}")]
    TaperedVia {
        /// The lower layer name.
        lower: String,
        /// The upper layer name.
        upper: String,
    },
    /// The grid specification is inconsistent.
    #[error("invalid grid setup: {0}")]
    Setup(String),
    /// An underlying database error.
    #[error(transparent)]
    Db(#[from] pdb::Error),
}
