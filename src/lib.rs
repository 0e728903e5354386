pub mod api;
pub mod capture;
pub mod cli;
pub mod feedback;
pub mod report;
pub mod run;
pub mod settings;
