pub mod rest;
pub mod token;
pub mod twiml;
pub mod webhook;
