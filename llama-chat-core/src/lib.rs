pub mod device;
pub mod dialog;
pub mod distributed;
pub mod errors;
pub mod generation;
pub mod model_args;
pub mod rendezvous;
