#![allow(dead_code)]

pub mod book;
pub mod harness;
pub mod scripted;
pub mod sink;
pub mod slow;
