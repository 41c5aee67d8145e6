pub(crate) mod plan;
pub(crate) mod run;
pub(crate) mod shared;
