pub(crate) mod logging;

#[allow(dead_code)]
pub(crate) mod roster;

#[allow(dead_code)]
pub(crate) mod round;
