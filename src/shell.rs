use axum::response::Html;

/// The static app shell served for every HTML route. Views are rendered
/// client-side against the JSON API; there is no server-side templating.
const SHELL_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta name="description" content="Taskhub - task tracking">
    <meta name="theme-color" content="#3498db">
    <title>Taskhub</title>
    <link rel="manifest" href="/manifest.json">
</head>
<body>
    <header class="app-header">
        <h1>Taskhub</h1>
    </header>
    <main id="app">
        <noscript>Taskhub needs JavaScript; the API is available under /api.</noscript>
    </main>
    <script src="/assets/app.js" defer></script>
</body>
</html>
"##;

pub fn page() -> Html<&'static str> {
    Html(SHELL_HTML)
}
