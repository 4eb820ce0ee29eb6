//! `lurk providers`: table of configured providers.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use crate::http::handlers::providers::provider_infos;
use crate::state::AppState;

pub fn list_providers(state: &AppState, json: bool) -> Result<()> {
    let infos = provider_infos(state);

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("Providers").bold());
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Id").fg(Color::White),
            Cell::new("Name").fg(Color::White),
            Cell::new("Kind").fg(Color::White),
            Cell::new("Model").fg(Color::White),
            Cell::new("Mode").fg(Color::White),
            Cell::new("Key").fg(Color::White),
        ]);

    for info in &infos {
        let key = if info.available {
            Cell::new("set").fg(Color::Green)
        } else {
            Cell::new("missing").fg(Color::Red)
        };
        let id = if info.enabled {
            Cell::new(&info.id).fg(Color::Cyan)
        } else {
            Cell::new(format!("{} (disabled)", info.id)).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            id,
            Cell::new(&info.display_name).fg(Color::White),
            Cell::new(info.kind).fg(Color::DarkGrey),
            Cell::new(&info.model).fg(Color::DarkGrey),
            Cell::new(info.capability.to_string()).fg(Color::DarkGrey),
            key,
        ]);
    }

    println!("{table}");
    println!();
    let available = infos.iter().filter(|i| i.available).count();
    println!(
        "  {} of {} providers have a credential",
        style(available).bold(),
        style(infos.len()).bold()
    );
    println!();
    Ok(())
}
