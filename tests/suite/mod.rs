mod breaker;
mod calibration;
mod demos;
mod ledger;
mod run_flow;
