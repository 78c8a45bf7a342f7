use vaultdb_core::DatabaseStatus;
use zeroize::Zeroizing;

use crate::app::AppContext;
use crate::errors::classify;

pub fn handle_status(ctx: &AppContext, json: bool) -> anyhow::Result<()> {
    let path = ctx.database_path()?;
    let service = ctx.service()?;
    let status = service.probe_status(&path).map_err(classify)?;

    let store_available = service.is_keychain_available();
    let key_remembered = service
        .try_get_key_from_keychain()
        .map(Zeroizing::new)
        .is_some();

    if json {
        let value = serde_json::json!({
            "database": path,
            "status": status,
            "secret_store": service.secret_store_name(),
            "secret_store_available": store_available,
            "key_remembered": key_remembered,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if ctx.quiet() {
        println!("{}", status_label(status));
        return Ok(());
    }

    println!("Database: {}", path.display());
    println!("Status: {}", status_label(status));
    println!(
        "Secret store: {} ({})",
        service.secret_store_name(),
        if store_available { "available" } else { "unavailable" }
    );
    println!("Remembered key: {}", if key_remembered { "yes" } else { "no" });
    Ok(())
}

fn status_label(status: DatabaseStatus) -> &'static str {
    match status {
        DatabaseStatus::Missing => "missing",
        DatabaseStatus::Plaintext => "plaintext",
        DatabaseStatus::Encrypted => "encrypted",
    }
}
