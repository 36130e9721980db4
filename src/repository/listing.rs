//! Scraping of HTML directory listings and the mirror list page

use reqwest::Url;
use scraper::{Html, Selector};

/// Entries of a directory listing page.
///
/// Keeps the relative, single-segment `href`s of `<a>` elements, so parent
/// links, sort links and absolute URLs are dropped.
pub fn parse_subitems(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(subitem_from_href)
        .collect()
}

fn subitem_from_href(href: &str) -> Option<String> {
    if href.is_empty() || href.starts_with("//") || Url::parse(href).is_ok() {
        return None;
    }

    let path = href.split(['?', '#']).next().unwrap_or_default();
    let normalized = normalize_posix(path);
    if normalized.contains('/') || normalized == "." || normalized == ".." {
        return None;
    }
    Some(normalized)
}

/// Mirror base URLs from the `/static/mirrorlist` page.
///
/// Each mirror row links its HTTP endpoint through an `<a>` whose text is
/// exactly `HTTP`. The links are upgraded to https and a bare `/` path is
/// dropped so paths can be appended directly.
pub fn parse_mirror_list(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter(|a| a.text().collect::<String>() == "HTTP")
        .filter_map(|a| a.value().attr("href"))
        .filter_map(mirror_from_href)
        .collect()
}

fn mirror_from_href(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    let host = url.host_str()?;
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();

    let mut path = normalize_posix(url.path());
    if path == "/" {
        path.clear();
    }

    Some(format!("https://{}{}{}", host, port, path))
}

/// Lexical normalization of a `/`-separated path: collapses `//`, `.` and
/// `..` without touching the filesystem.
fn normalize_posix(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body>
        <h1>Index of /online/qtsdkrepository</h1>
        <table>
        <tr><th><a href="?C=N;O=D">Name</a></th><th><a href="?C=M;O=A">Last modified</a></th></tr>
        <tr><td><a href="/online/">Parent Directory</a></td></tr>
        <tr><td><a href="linux_x64/">linux_x64/</a></td></tr>
        <tr><td><a href="mac_x64/">mac_x64/</a></td></tr>
        <tr><td><a href="windows_x86/">windows_x86/</a></td></tr>
        <tr><td><a href="./all_os/">all_os/</a></td></tr>
        <tr><td><a href="../">up</a></td></tr>
        <tr><td><a href="https://www.qt.io/">Qt</a></td></tr>
        <tr><td><a href="//cdn.example/x">cdn</a></td></tr>
        <tr><td><a>no href</a></td></tr>
        </table></body></html>"#;

    #[test]
    fn test_parse_subitems() {
        assert_eq!(
            parse_subitems(LISTING),
            vec!["linux_x64", "mac_x64", "windows_x86", "all_os"]
        );
    }

    #[test]
    fn test_parse_subitems_empty_page() {
        assert!(parse_subitems("").is_empty());
        assert!(parse_subitems("<html><p>nothing here</p></html>").is_empty());
    }

    #[test]
    fn test_parse_mirror_list() {
        let html = r#"<table>
            <tr><td>Primary</td><td><a href="http://mirror.one.example/qtproject/">HTTP</a></td>
                <td><a href="ftp://mirror.one.example/qtproject/">FTP</a></td></tr>
            <tr><td><a href="https://mirror.two.example/">HTTP</a></td>
                <td><a href="rsync://mirror.two.example/qt">RSYNC</a></td></tr>
            <tr><td><a href="http://mirror.three.example:8080/pub//qt/./">HTTP</a></td></tr>
            <tr><td><a href="/relative/">HTTP</a></td></tr>
            <tr><td><a href="http://mirror.four.example/qt">Homepage</a></td></tr>
        </table>"#;

        assert_eq!(
            parse_mirror_list(html),
            vec![
                "https://mirror.one.example/qtproject",
                "https://mirror.two.example",
                "https://mirror.three.example:8080/pub/qt",
            ]
        );
    }

    #[test]
    fn test_normalize_posix() {
        assert_eq!(normalize_posix("linux_x64/"), "linux_x64");
        assert_eq!(normalize_posix("a/./b/../c"), "a/c");
        assert_eq!(normalize_posix("../x"), "../x");
        assert_eq!(normalize_posix("/../x"), "/x");
        assert_eq!(normalize_posix(""), ".");
        assert_eq!(normalize_posix("/"), "/");
    }
}
