use dotenv::dotenv;
use lapas_session::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let lapas = Lapas::from_env()?;
    let session = lapas.session_manager();
    session.start();
    session.wait_until_settled().await;

    for role in [Role::Administrator, Role::Partner] {
        let profile = session.sign_in_demo(role).await?;
        let snapshot = session.snapshot();
        println!(
            "{}: {} <{}> demo={} admin={}",
            role,
            profile.full_name,
            profile.email,
            snapshot.is_demo(),
            snapshot.has_role(Role::Administrator)
        );

        let patch = ProfilePatch {
            organization: Some("Lapas Kelas I".to_string()),
            ..Default::default()
        };
        let updated = session.update_profile(patch).await?;
        println!("  organization: {:?}", updated.organization);

        session.sign_out().await?;
    }

    Ok(())
}
