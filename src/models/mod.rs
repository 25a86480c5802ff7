pub mod artist;
pub mod exclusion;
pub mod genre;
pub mod playlist;
pub mod request;
pub mod track;

pub use artist::*;
pub use exclusion::*;
pub use genre::*;
pub use playlist::*;
pub use request::*;
pub use track::*;
