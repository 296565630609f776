//! Background tasks for the fieldsync worker binary.

pub mod background;
