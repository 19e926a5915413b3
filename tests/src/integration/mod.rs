pub mod multiplexing;
pub mod processor_flows;
