//! Top bar UI: site and product selection, file open and display toggles.

use super::colors;
use crate::app::ViewState;
use eframe::egui::{self, Color32, RichText};
use egui_phosphor::regular as icons;
use wxradar_workbench::data::all_sites_sorted;
use wxradar_workbench::radar::{ProductType, SiteId};

pub fn render_top_bar(ctx: &egui::Context, state: &mut ViewState) {
    egui::TopBottomPanel::top("top_bar")
        .exact_height(36.0)
        .show(ctx, |ui| {
            ui.horizontal_centered(|ui| {
                // App title
                ui.label(
                    RichText::new("Radar Workbench")
                        .strong()
                        .size(16.0)
                        .color(Color32::WHITE),
                );

                ui.separator();

                site_selector(ui, state);
                product_selector(ui, state);

                ui.separator();

                if ui
                    .button(format!("{} Open", icons::FOLDER_OPEN))
                    .on_hover_text("Open a sweep file")
                    .clicked()
                {
                    state.open_file_requested = true;
                }
                if ui
                    .button(icons::TRASH)
                    .on_hover_text("Drop every sweep for this site")
                    .clicked()
                {
                    state.clear_site_requested = true;
                }

                ui.separator();

                let demo_icon = if state.demo_mode {
                    icons::PAUSE
                } else {
                    icons::PLAY
                };
                ui.toggle_value(&mut state.demo_mode, format!("{} Demo", demo_icon));
                ui.toggle_value(&mut state.show_range_rings, "Rings");
                ui.toggle_value(&mut state.show_all_sites, "Sites");
                ui.add(
                    egui::Slider::new(&mut state.opacity, 0.1..=1.0)
                        .text("Opacity")
                        .fixed_decimals(2),
                );

                ui.separator();

                // Status text
                ui.label(
                    RichText::new(&state.status_message)
                        .size(13.0)
                        .color(colors::ui::VALUE),
                );
            });
        });
}

fn site_selector(ui: &mut egui::Ui, state: &mut ViewState) {
    ui.label(RichText::new("Site:").size(12.0).color(Color32::GRAY));
    egui::ComboBox::from_id_salt("site_selector")
        .selected_text(RichText::new(state.site.as_str()).monospace())
        .width(70.0)
        .show_ui(ui, |ui| {
            for site in all_sites_sorted() {
                let id = site.site_id();
                let selected = id == state.site;
                if ui
                    .selectable_label(selected, format!("{}  {}", site.id, site.name))
                    .clicked()
                {
                    state.site = id;
                }
            }
        });

    // Sites loaded from files may not be in the table
    if !is_known_site(&state.site) {
        ui.label(
            RichText::new(format!("({})", state.site))
                .monospace()
                .color(colors::ui::WARNING),
        );
    }
}

fn product_selector(ui: &mut egui::Ui, state: &mut ViewState) {
    ui.label(RichText::new("Product:").size(12.0).color(Color32::GRAY));
    egui::ComboBox::from_id_salt("product_selector")
        .selected_text(state.product.short_name())
        .show_ui(ui, |ui| {
            for product in ProductType::all() {
                ui.selectable_value(&mut state.product, *product, product.label());
            }
            if let ProductType::Unknown(_) = state.product {
                // Keep an unknown product from a file selectable
                let current = state.product;
                ui.selectable_value(&mut state.product, current, current.label());
            }
        });
}

fn is_known_site(site: &SiteId) -> bool {
    all_sites_sorted().iter().any(|s| &s.site_id() == site)
}
