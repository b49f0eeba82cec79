//! Walks through starting an authorization-code + PKCE login and handing the
//! authorize URL to the end-user, leaving the callback for the redirect handler.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use url::Url;
// self
use oidc_session::{
	auth::ScopeSet,
	manager::SessionManager,
	provider::Issuer,
	store::{MemoryStorage, SessionStorage},
};

fn main() -> Result<()> {
	color_eyre::install()?;

	let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::default());
	let issuer = Issuer::keycloak(&Url::parse("https://sso.example.com")?, "demo-realm")?;
	let manager = SessionManager::new(
		storage,
		issuer,
		"demo-client",
		Url::parse("http://localhost:3000/callback")?,
		ScopeSet::new(["profile", "email"])?,
	)?;
	let attempt = manager.begin_login();

	println!("Send your user to {}.", &attempt.authorize_url);
	println!(
		"PKCE challenge ({:?}): {}.",
		attempt.code_challenge_method(),
		attempt.code_challenge()
	);
	println!(
		"When the callback arrives on {}, pass its full URL to SessionManager::complete_login.",
		&attempt.redirect_uri
	);

	Ok(())
}
