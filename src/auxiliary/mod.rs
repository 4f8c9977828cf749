//! Helper items to assist the working of qunfold.

pub mod kpoint_comparator;
