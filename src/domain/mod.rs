// Domain layer: table model, answers and the ports the pipeline is generic over.

pub mod model;
pub mod ports;
