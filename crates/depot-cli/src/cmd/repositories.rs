//! Repositories command

use crate::ops::Context;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

/// Print every configured repository as a table.
pub fn repositories(ctx: &Context) {
    let repositories = ctx.service.repositories();
    if repositories.is_empty() {
        println!();
        println!("  No repositories configured.");
        println!(
            "  Add [[storages]] to {} to get started.",
            depot_core::config_path(&ctx.home).display()
        );
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Repository", "Type", "Policy", "Status", "Trash", "Members / Remote"]);

    for repository in repositories {
        let detail = match (&repository.remote, repository.group_members.is_empty()) {
            (Some(remote), _) => remote.url.clone(),
            (None, false) => repository.group_members.join(", "),
            (None, true) => String::new(),
        };
        let status = if repository.is_in_service() {
            "in service"
        } else {
            "out of service"
        };
        table.add_row(vec![
            repository.key().to_string(),
            repository.repository_type.to_string(),
            repository.policy.to_string(),
            status.to_string(),
            if repository.trash_enabled { "yes" } else { "no" }.to_string(),
            detail,
        ]);
    }
    println!("{table}");
}
