//! GUI module - Application state and UI rendering
//!
//! This module contains the main application state and egui-based UI.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use eframe::egui;
use egui_extras::{Column, TableBuilder};
use rfd::FileDialog;
use serde::{Deserialize, Serialize};

use crate::file_ops::{CleanupOptions, CleanupRunner, FormatSelection, RunSummary};
use crate::run_log::LOG_FILE_NAME;
use crate::scanner::{self, FolderScan, VIDEO_EXTENSIONS};

/// Shared state for a background cleanup run
struct RunState {
    outcome: Mutex<Option<Result<RunSummary, String>>>,
    is_complete: AtomicBool,
    progress_done: AtomicUsize,
    progress_total: AtomicUsize,
}

impl RunState {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            is_complete: AtomicBool::new(false),
            progress_done: AtomicUsize::new(0),
            progress_total: AtomicUsize::new(0),
        }
    }
}

#[derive(Clone)]
enum MessageType {
    Info,
    Success,
    Error,
}

/// Settings restored across sessions
#[derive(Serialize, Deserialize)]
struct StoredSettings {
    kept_extensions: BTreeSet<String>,
    backup_enabled: bool,
    last_root: Option<PathBuf>,
}

/// Application state
pub struct VideoCleanerApp {
    root_folder: Option<PathBuf>,
    scan_results: Vec<FolderScan>,
    formats: FormatSelection,
    backup_enabled: bool,
    is_running: bool,
    run_state: Arc<RunState>,
    run_handle: Option<JoinHandle<()>>,
    completed_summary: Option<RunSummary>,
    status_message: Option<(String, MessageType)>,
    last_scan: Option<DateTime<Local>>,
}

impl Default for VideoCleanerApp {
    fn default() -> Self {
        Self {
            root_folder: None,
            scan_results: Vec::new(),
            formats: FormatSelection::default(),
            backup_enabled: true,
            is_running: false,
            run_state: Arc::new(RunState::new()),
            run_handle: None,
            completed_summary: None,
            status_message: None,
            last_scan: None,
        }
    }
}

impl VideoCleanerApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let mut app = Self::default();
        if let Some(settings) = cc
            .storage
            .and_then(|s| eframe::get_value::<StoredSettings>(s, eframe::APP_KEY))
        {
            app.formats = FormatSelection::from_kept(&settings.kept_extensions);
            app.backup_enabled = settings.backup_enabled;
            if let Some(root) = settings.last_root.filter(|p| p.is_dir()) {
                app.root_folder = Some(root);
                app.rescan();
            }
        }
        app
    }

    fn select_root(&mut self, path: PathBuf) {
        log::info!("Selected root folder: {}", path.display());
        self.root_folder = Some(path);
        self.completed_summary = None;
        if self.rescan() {
            self.status_message = Some((
                format!("Found {} subfolder(s)", self.scan_results.len()),
                MessageType::Info,
            ));
        }
    }

    /// Refresh the results table. Returns false when the scan failed.
    fn rescan(&mut self) -> bool {
        let Some(root) = self.root_folder.clone() else {
            return false;
        };
        match scanner::scan_root(&root) {
            Ok(results) => {
                self.scan_results = results;
                self.last_scan = Some(Local::now());
                true
            }
            Err(e) => {
                self.scan_results.clear();
                self.status_message = Some((format!("Scan failed: {e}"), MessageType::Error));
                false
            }
        }
    }

    fn start_run(&mut self) {
        let Some(root) = self.root_folder.clone() else {
            self.status_message = Some(("No folder selected.".to_string(), MessageType::Error));
            return;
        };

        // The table may be stale, so the run acts on a fresh scan.
        let folders = match scanner::scan_root(&root) {
            Ok(folders) => folders,
            Err(e) => {
                self.status_message = Some((format!("Scan failed: {e}"), MessageType::Error));
                return;
            }
        };
        self.scan_results = folders.clone();
        self.last_scan = Some(Local::now());

        let options = CleanupOptions::from_selection(&self.formats, self.backup_enabled);
        self.is_running = true;
        self.completed_summary = None;
        self.run_state = Arc::new(RunState::new());
        self.run_state
            .progress_total
            .store(folders.len(), Ordering::Relaxed);

        let state = Arc::clone(&self.run_state);
        let handle = thread::spawn(move || {
            let outcome = CleanupRunner::new(&root, &options)
                .and_then(|mut runner| runner.run(&folders, &state.progress_done))
                .map_err(|e| e.to_string());
            if let Ok(mut guard) = state.outcome.lock() {
                *guard = Some(outcome);
            }
            state.is_complete.store(true, Ordering::SeqCst);
        });

        self.run_handle = Some(handle);
        self.status_message = Some((
            format!("Cleaning up {} subfolder(s)...", self.scan_results.len()),
            MessageType::Info,
        ));
    }

    fn check_run_complete(&mut self) {
        if !self.is_running || !self.run_state.is_complete.load(Ordering::SeqCst) {
            return;
        }

        let outcome = self
            .run_state
            .outcome
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        self.is_running = false;

        if let Some(handle) = self.run_handle.take() {
            let _ = handle.join();
        }

        let rescan_ok = self.rescan();
        match outcome {
            Some(Ok(summary)) => {
                if rescan_ok {
                    self.status_message = if summary.errors.is_empty() {
                        Some((
                            format!(
                                "Moved {} folder(s), deleted {} file(s).",
                                summary.folders_moved, summary.files_deleted
                            ),
                            MessageType::Success,
                        ))
                    } else {
                        Some((
                            format!(
                                "Finished with {} error(s), see {}",
                                summary.errors.len(),
                                LOG_FILE_NAME
                            ),
                            MessageType::Error,
                        ))
                    };
                }
                self.completed_summary = Some(summary);
            }
            Some(Err(e)) => {
                self.status_message = Some((format!("Cleanup failed: {e}"), MessageType::Error));
            }
            None => {
                self.status_message =
                    Some(("Cleanup finished without a result.".to_string(), MessageType::Error));
            }
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        if self.is_running {
            return;
        }
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        for file in dropped {
            if let Some(path) = file.path {
                if path.is_dir() {
                    self.select_root(path);
                    break;
                }
            }
        }
    }

    fn render_header(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Video Folder Cleaner");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("v{}", env!("CARGO_PKG_VERSION")));
                ui.separator();
                if ui.button("View log").on_hover_text(LOG_FILE_NAME).clicked() {
                    let _ = open::that(LOG_FILE_NAME);
                }
            });
        });
        ui.separator();
    }

    fn render_folder_selection(&mut self, ui: &mut egui::Ui) {
        let hovering_files = ui.ctx().input(|i| !i.raw.hovered_files.is_empty());

        ui.horizontal(|ui| {
            ui.label("Root folder:");
            if ui
                .add_enabled(!self.is_running, egui::Button::new("Browse"))
                .clicked()
            {
                if let Some(folder) = FileDialog::new().pick_folder() {
                    self.select_root(folder);
                }
            }
            if ui
                .add_enabled(
                    self.root_folder.is_some() && !self.is_running,
                    egui::Button::new("Rescan"),
                )
                .clicked()
                && self.rescan()
            {
                self.status_message = Some((
                    format!("Found {} subfolder(s)", self.scan_results.len()),
                    MessageType::Info,
                ));
            }
            match &self.root_folder {
                Some(root) => {
                    ui.monospace(root.display().to_string());
                }
                None => {
                    let hint = if hovering_files {
                        "Release to select folder"
                    } else {
                        "Drop a folder here or browse"
                    };
                    ui.label(egui::RichText::new(hint).italics());
                }
            }
        });
    }

    fn render_format_selection(&mut self, ui: &mut egui::Ui) {
        ui.label("Formats to keep:");
        ui.add_enabled_ui(!self.is_running, |ui| {
            egui::Grid::new("format_grid").show(ui, |ui| {
                for (i, ext) in VIDEO_EXTENSIONS.iter().enumerate() {
                    let mut kept = self.formats.is_kept(ext);
                    if ui.checkbox(&mut kept, format!(".{ext}")).changed() {
                        self.formats.set_kept(ext, kept);
                    }
                    if (i + 1) % 5 == 0 {
                        ui.end_row();
                    }
                }
            });
        });
    }

    fn render_run_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_enabled_ui(!self.is_running, |ui| {
                ui.checkbox(&mut self.backup_enabled, "Backup deleted files");
            });
            ui.separator();
            if self.is_running {
                ui.spinner();
                let done = self.run_state.progress_done.load(Ordering::Relaxed);
                let total = self.run_state.progress_total.load(Ordering::Relaxed);
                let fraction = if total > 0 {
                    done as f32 / total as f32
                } else {
                    0.0
                };
                ui.add(
                    egui::ProgressBar::new(fraction)
                        .desired_width(300.0)
                        .text(format!("{done}/{total}")),
                );
            } else if ui.button("Run cleanup").clicked() {
                self.start_run();
            }
        });
    }

    fn render_results_table(&mut self, ui: &mut egui::Ui) {
        if self.scan_results.is_empty() {
            if self.root_folder.is_none() {
                ui.vertical_centered(|ui| {
                    ui.add_space(40.0);
                    ui.label("Select a folder of video subfolders to get started.");
                });
            } else {
                ui.separator();
                ui.label("No subfolders found.");
            }
            return;
        }

        ui.separator();
        let with_preferred = self
            .scan_results
            .iter()
            .filter(|f| f.preferred_present)
            .count();
        ui.label(format!(
            "{} subfolder(s) | {} with MP4 | {} without",
            self.scan_results.len(),
            with_preferred,
            self.scan_results.len() - with_preferred
        ));
        ui.separator();

        let folders = &self.scan_results;
        TableBuilder::new(ui)
            .striped(true)
            .column(Column::auto().at_least(160.0).resizable(true))
            .column(Column::auto().at_least(90.0))
            .column(Column::remainder())
            .column(Column::auto())
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("Subfolder");
                });
                header.col(|ui| {
                    ui.strong("MP4 Available");
                });
                header.col(|ui| {
                    ui.strong("Other Formats");
                });
                header.col(|_ui| {});
            })
            .body(|body| {
                body.rows(20.0, folders.len(), |mut row| {
                    let folder = &folders[row.index()];
                    row.col(|ui| {
                        ui.label(&folder.name);
                    });
                    row.col(|ui| {
                        if folder.preferred_present {
                            ui.label(
                                egui::RichText::new("Yes")
                                    .color(egui::Color32::from_rgb(100, 255, 100)),
                            );
                        } else {
                            ui.label(egui::RichText::new("No").color(egui::Color32::RED));
                        }
                    });
                    row.col(|ui| {
                        ui.label(&folder.other_formats);
                    });
                    row.col(|ui| {
                        if ui
                            .small_button("📂")
                            .on_hover_text("Open in file manager")
                            .clicked()
                        {
                            let _ = open::that(&folder.path);
                        }
                    });
                });
            });
    }

    fn render_status_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if let Some((msg, msg_type)) = &self.status_message {
                let color = match msg_type {
                    MessageType::Info => egui::Color32::GRAY,
                    MessageType::Success => egui::Color32::from_rgb(100, 255, 100),
                    MessageType::Error => egui::Color32::RED,
                };
                ui.label(egui::RichText::new(msg).color(color));
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(scanned) = self.last_scan {
                    ui.label(format!("Scanned at {}", scanned.format("%H:%M:%S")));
                }
            });
        });
    }

    fn render_summary_dialog(&mut self, ctx: &egui::Context) {
        let Some(summary) = self.completed_summary.clone() else {
            return;
        };

        let mut dismiss = false;
        egui::Window::new("Cleanup complete")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(format!("Moved {} folder(s).", summary.folders_moved));
                ui.label(format!("Deleted {} file(s).", summary.files_deleted));
                if !summary.errors.is_empty() {
                    ui.label(
                        egui::RichText::new(format!("{} error(s)", summary.errors.len()))
                            .color(egui::Color32::RED),
                    );
                }
                ui.label(
                    egui::RichText::new(format!("Details in {LOG_FILE_NAME}")).small(),
                );
                ui.add_space(4.0);
                ui.horizontal(|ui| {
                    if ui.button("OK").clicked() {
                        dismiss = true;
                    }
                    if ui.button("View log").clicked() {
                        let _ = open::that(LOG_FILE_NAME);
                    }
                });
            });
        if dismiss {
            self.completed_summary = None;
        }
    }
}

impl eframe::App for VideoCleanerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_run_complete();
        if self.is_running {
            ctx.request_repaint();
        }
        self.handle_dropped_files(ctx);

        // Bottom panel for status bar - always anchored at bottom
        egui::TopBottomPanel::bottom("status_bar")
            .exact_height(28.0)
            .show(ctx, |ui| {
                self.render_status_bar(ui);
            });

        // Central panel for main content - fills remaining space
        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_header(ui);
            self.render_folder_selection(ui);
            ui.add_space(4.0);
            self.render_format_selection(ui);
            ui.add_space(4.0);
            self.render_run_controls(ui);
            self.render_results_table(ui);
        });

        self.render_summary_dialog(ctx);
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(
            storage,
            eframe::APP_KEY,
            &StoredSettings {
                kept_extensions: self.formats.keep_extensions(),
                backup_enabled: self.backup_enabled,
                last_root: self.root_folder.clone(),
            },
        );
    }
}
