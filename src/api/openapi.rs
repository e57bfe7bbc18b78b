use super::handlers::{auth, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec.
/// Routes added outside (like `/` or `OPTIONS /health`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::session::refresh))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::verification::verify_email))
        .routes(routes!(auth::verification::resend_verification))
        .routes(routes!(auth::password_reset::forgot_password))
        .routes(routes!(auth::password_reset::validate_reset_token))
        .routes(routes!(auth::password_reset::reset_password))
        .routes(routes!(auth::google::google_authorize))
        .routes(routes!(auth::google::google_callback))
        .routes(routes!(auth::me::me, auth::me::delete_me))
        .routes(routes!(auth::me::change_password))
        .routes(routes!(auth::admin::admin_list_users, auth::admin::admin_delete_all))
        .routes(routes!(
            auth::admin::admin_list_unverified,
            auth::admin::admin_delete_unverified
        ))
        .routes(routes!(auth::admin::admin_get_user, auth::admin::admin_delete_user))
        .routes(routes!(auth::admin::admin_update_role))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).tags(Some(tags())).build()
}

fn tags() -> Vec<Tag> {
    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, verification, login, and tokens".to_string());

    let mut me_tag = Tag::new("me");
    me_tag.description = Some("The authenticated account".to_string());

    let mut admin_tag = Tag::new("admin");
    admin_tag.description = Some("Role-gated account management".to_string());

    vec![auth_tag, me_tag, admin_tag]
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Konto"));
            assert_eq!(contact.email.as_deref(), Some("team@konto.dev"));
        }
    }

    #[test]
    fn openapi_registers_all_routes() {
        let spec = openapi();
        let paths = &spec.paths.paths;

        for path in [
            "/health",
            "/v1/auth/register",
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/verify-email",
            "/v1/auth/resend-verification",
            "/v1/auth/forgot-password",
            "/v1/auth/validate-reset-token",
            "/v1/auth/reset-password",
            "/v1/auth/google",
            "/v1/auth/google/callback",
            "/v1/me",
            "/v1/me/password",
            "/v1/admin/users",
            "/v1/admin/users/unverified",
            "/v1/admin/users/{id}",
            "/v1/admin/users/{id}/role",
        ] {
            assert!(paths.contains_key(path), "missing path: {path}");
        }
    }

    #[test]
    fn openapi_declares_tags() {
        let spec = openapi();
        let names: Vec<String> = spec
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|tag| tag.name)
            .collect();
        assert_eq!(names, ["auth", "me", "admin"]);
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Team Konto <team@konto.dev>"),
            (Some("Team Konto"), Some("team@konto.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author(""), (None, None));
    }
}
