use std::env;

use dotenv::dotenv;
use lapas_session::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // SUPABASE_URL / SUPABASE_ANON_KEY are required, LAPAS_* are optional
    let lapas = Lapas::from_env()?;
    let session = lapas.session_manager();
    session.start();

    let snapshot = session.wait_until_settled().await;
    println!("restored: {}", snapshot.state.tag());

    let snapshot = if snapshot.identity().is_none() {
        let email = env::var("LAPAS_EMAIL")?;
        let password = env::var("LAPAS_PASSWORD")?;
        match session.sign_in(&email, &password).await {
            Ok(identity) => {
                println!("signed in as {}", identity.id);
                session.wait_for_identity(&identity.id).await
            }
            Err(e) => {
                println!("sign in failed ({:?}): {}", e.kind(), e);
                return Ok(());
            }
        }
    } else {
        snapshot
    };

    match (&snapshot.state, snapshot.profile()) {
        (_, Some(profile)) => {
            println!("profile: {} <{}>", profile.full_name, profile.email);
            println!("role: {} (source {:?})", profile.role, snapshot.profile_source());
        }
        (SessionState::AuthenticatedNoProfile { identity }, None) => {
            println!("signed in as {} but the profile could not be loaded", identity.id);
        }
        (state, None) => println!("session is {}", state.tag()),
    }
    if let Some(kind) = snapshot.last_error {
        println!("last error: {:?}", kind);
    }

    session.sign_out().await?;
    println!("signed out");
    Ok(())
}
