// flock-common: wire types shared by the Flock socket relay and its clients

pub mod protocol;
pub mod types;
