pub mod context;
pub mod destination;
pub mod fee_calculator;
pub mod service;
pub mod swap_builder;
pub mod swap_data;
pub mod swap_fee;
pub mod top_up_builder;
pub mod transit;
