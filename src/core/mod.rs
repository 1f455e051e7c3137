// Domain-layer modules and shared errors/models
pub mod documents {
    pub use crate::documents::*;
}

pub mod lifecycle {
    pub use crate::lifecycle::*;
}

pub mod proposal_number {
    pub use crate::proposal_number::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod errors {
    pub use crate::errors::*;
}
