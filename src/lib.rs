//! Point location and overlap tests for curvilinear quadrilateral and
//! hexahedral isoparametric elements of arbitrary polynomial order.
//!
//! The crate provides the geometric kernel used to build donor/receptor
//! relations between overlapping meshes:
//!  - Lagrange shape functions and derivatives for line, quad and hex
//!    elements ([`basis`]), including the node-ordering maps between the
//!    external mesh-format convention and the lexicographic tensor ordering
//!    ([`ordering`])
//!  - inversion of the isoparametric mapping with a damped Newton iteration
//!    to get the reference coordinates of a physical point ([`mapping`])
//!  - a constrained Nelder-Mead search for the deepest point of intersection
//!    between a face and an element ([`intersect`])
//!
//! All operations are plain data-in / data-out: element coordinates are flat
//! `&[f64]` buffers owned by the caller, and the only process-wide state is
//! the immutable node-ordering cache.
use core::fmt;
use nalgebra::SVector;

pub mod basis;
pub mod intersect;
pub mod linalg;
pub mod mapping;
pub mod ordering;

/// Result
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Error
#[derive(Debug)]
pub struct Error(String);
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "There is an error: {}", self.0)
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Set the error message
    #[must_use]
    pub fn from(msg: &str) -> Box<Self> {
        Box::new(Self(msg.into()))
    }
}

/// Location in physical or reference space in D dimensions
pub type Point<const D: usize> = SVector<f64, D>;

/// Assert that two floating point values are closer than a tolerance
#[macro_export]
macro_rules! assert_delta {
    ($x:expr, $y:expr, $d:expr) => {
        assert!(
            ($x - $y).abs() < $d,
            "({:.3e} - {:.3e}).abs() = {:.3e}",
            $x,
            $y,
            ($x - $y).abs()
        )
    };
}
