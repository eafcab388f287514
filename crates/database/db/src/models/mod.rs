pub(crate) mod encrypted_commitment;
pub(crate) mod metadata;
pub(crate) mod settlement;
pub(crate) mod winner;
