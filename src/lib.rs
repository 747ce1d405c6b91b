pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod session;
pub mod platform {
    pub mod camera;
    pub mod command;
    pub mod gpio;
    pub mod printer;
    pub mod storage;
}
pub mod processing {
    pub mod color;
    pub mod composite;
    pub mod enhance;
    pub mod layout;
}
pub mod tasks {
    pub mod capture;
    pub mod control;
    pub mod controller;
    pub mod dispatcher;
    pub mod monitor;
}
