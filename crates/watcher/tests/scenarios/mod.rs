//! Integration scenarios

mod delivery;
