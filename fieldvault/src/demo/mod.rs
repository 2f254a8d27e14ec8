//! The CSFLE and queryable-encryption walkthroughs.
//!
//! Each flow connects, manages data keys, declares encrypted fields, writes
//! the [`sample`] records and reads them back through an encrypted and a
//! plain session. Flows run as [`driver`](crate::driver) steps and report
//! through an [`Observer`](crate::event::Observer); they never print.

pub mod csfle;
pub mod qe;
pub mod sample;
