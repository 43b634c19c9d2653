//! Server-rendered HTML for the login and user listing pages.

use crate::users::UserRecord;
use std::fmt::Write as _;

/// Values echoed back into the login form.
#[derive(Debug, Default)]
pub struct LoginPage<'a> {
    pub email: &'a str,
    pub next: Option<&'a str>,
    pub error: Option<&'a str>,
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body>
{body}
</body>
</html>
"#,
        title = html_escape(title),
    )
}

#[must_use]
pub fn login(page: &LoginPage<'_>) -> String {
    let mut body = String::from("<h1>Sign in</h1>\n");
    if let Some(error) = page.error {
        let _ = writeln!(body, r#"<p class="error" role="alert">{}</p>"#, html_escape(error));
    }
    body.push_str(r#"<form method="post" action="/login">"#);
    body.push('\n');
    let _ = writeln!(
        body,
        r#"<label>Email <input type="email" name="email" value="{}" autocomplete="username" required></label>"#,
        html_escape(page.email)
    );
    body.push_str(
        r#"<label>Password <input type="password" name="password" autocomplete="current-password" required></label>"#,
    );
    body.push('\n');
    if let Some(next) = page.next {
        let _ = writeln!(
            body,
            r#"<input type="hidden" name="next" value="{}">"#,
            html_escape(next)
        );
    }
    body.push_str("<button type=\"submit\">Sign in</button>\n</form>");
    layout("Sign in", &body)
}

#[must_use]
pub fn users(users: &[UserRecord], current_user: &str) -> String {
    let mut body = format!(
        "<p>Signed in as <strong>{}</strong> · <a href=\"/logout\">Sign out</a></p>\n<h1>Users</h1>\n",
        html_escape(current_user)
    );
    if users.is_empty() {
        body.push_str("<p>No users registered yet.</p>");
        return layout("Users", &body);
    }
    body.push_str(
        "<table>\n<thead><tr><th>ID</th><th>First name</th><th>Last name</th><th>Email</th></tr></thead>\n<tbody>\n",
    );
    for user in users {
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            user.id,
            html_escape(&user.first_name),
            html_escape(&user.last_name),
            html_escape(&user.email)
        );
    }
    body.push_str("</tbody>\n</table>");
    layout("Users", &body)
}
