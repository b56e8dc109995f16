// ABOUTME: HTML pages served by the loopback manage server
// ABOUTME: The accounts page embeds the session CSRF token for client-side script

/// Render the accounts administration page.
///
/// The CSRF token is embedded as a JavaScript constant and attached by the
/// page's script to every state-mutating request as `X-CSRF-Token`.
pub fn accounts_page(csrf_token: &str) -> String {
    ACCOUNTS_TEMPLATE.replace("__CSRF_TOKEN__", csrf_token)
}

pub fn success_page(email: &str) -> String {
    SUCCESS_TEMPLATE.replace("__EMAIL__", email)
}

pub fn cancelled_page() -> &'static str {
    CANCELLED_HTML
}

pub fn exchange_failed_page() -> &'static str {
    EXCHANGE_FAILED_HTML
}

const ACCOUNTS_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>gwc accounts</title>
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; max-width: 640px; margin: 60px auto; }
        h1 { font-size: 1.3rem; }
        li { margin: 6px 0; }
        .default { font-weight: bold; }
        button { margin-left: 8px; }
        #error { color: #b91c1c; }
    </style>
</head>
<body>
    <h1>gwc accounts</h1>
    <ul id="accounts"></ul>
    <p id="error"></p>
    <script>
        const csrfToken = '__CSRF_TOKEN__';

        async function post(path, email) {
            const res = await fetch(path, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json', 'X-CSRF-Token': csrfToken },
                body: JSON.stringify({ email }),
            });
            if (!res.ok) {
                document.getElementById('error').textContent = 'request failed: ' + res.status;
                return;
            }
            await load();
        }

        async function load() {
            const res = await fetch('/accounts');
            const body = await res.json();
            const list = document.getElementById('accounts');
            list.innerHTML = '';
            for (const account of body.accounts) {
                const item = document.createElement('li');
                item.textContent = account.email + (account.is_default ? ' (default)' : '');
                if (account.is_default) item.classList.add('default');
                const setDefault = document.createElement('button');
                setDefault.textContent = 'make default';
                setDefault.onclick = () => post('/set-default', account.email);
                const remove = document.createElement('button');
                remove.textContent = 'remove';
                remove.onclick = () => post('/remove-account', account.email);
                item.append(setDefault, remove);
                list.appendChild(item);
            }
        }

        load();
    </script>
</body>
</html>"#;

const SUCCESS_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Authentication Successful</title>
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; max-width: 600px; margin: 100px auto; text-align: center; }
        h1 { color: #22c55e; }
        p { color: #64748b; }
    </style>
</head>
<body>
    <h1>Authentication Successful</h1>
    <p>Signed in as <strong>__EMAIL__</strong>.</p>
    <p>You can now close this tab and return to your terminal.</p>
</body>
</html>"#;

const CANCELLED_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Authentication Cancelled</title>
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; max-width: 600px; margin: 100px auto; text-align: center; }
        p { color: #64748b; }
    </style>
</head>
<body>
    <h1>Authentication Cancelled</h1>
    <p>No changes were made. You can close this tab and return to your terminal.</p>
</body>
</html>"#;

const EXCHANGE_FAILED_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Authentication Failed</title>
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; max-width: 600px; margin: 100px auto; text-align: center; }
        h1 { color: #b91c1c; }
        p { color: #64748b; }
    </style>
</head>
<body>
    <h1>Authentication Failed</h1>
    <p>The token exchange with Google did not complete. Check the terminal for details.</p>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accounts_page_embeds_csrf_token() {
        let page = accounts_page("csrf-123");
        assert!(page.contains("const csrfToken = 'csrf-123';"));
        assert!(!page.contains("__CSRF_TOKEN__"));
    }

    #[test]
    fn test_success_page_names_account() {
        let page = success_page("a@b.com");
        assert!(page.contains("a@b.com"));
    }
}
