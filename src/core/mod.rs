// Domain-layer modules and shared errors/models
pub mod valuation {
    pub use crate::valuation::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
