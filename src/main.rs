//! Video Folder Cleaner - A lightweight video folder tidying tool
//!
//! This application scans a folder of video subfolders, shows which ones
//! already hold the preferred MP4 format, and cleans up the rest with a
//! simple GUI interface.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod file_ops;
mod run_log;
mod scanner;

use app::VideoCleanerApp;

fn main() -> eframe::Result<()> {
    // Initialize logging in debug mode
    #[cfg(debug_assertions)]
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([760.0, 620.0])
            .with_min_inner_size([560.0, 420.0])
            .with_title("Video Folder Cleaner"),
        ..Default::default()
    };

    eframe::run_native(
        "Video Folder Cleaner",
        options,
        Box::new(|cc| Ok(Box::new(VideoCleanerApp::new(cc)))),
    )
}
