#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    gui::app::main::run()
}
