use axum::http::HeaderMap;

use crate::models::DeviceInfo;

/// リクエストヘッダーからデバイス情報を組み立てる
///
/// User-Agent のベストエフォート解析。表示専用のメタデータであり、
/// 認可判断には使用しない
pub fn device_info_from_headers(headers: &HeaderMap) -> DeviceInfo {
    let user_agent = headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    // プロキシ経由の場合は X-Forwarded-For の先頭が接続元
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    match user_agent {
        Some(ua) => {
            let (browser, os, device_type) = parse_user_agent(ua);
            DeviceInfo {
                browser,
                os,
                device_type,
                ip_address,
            }
        }
        None => DeviceInfo {
            ip_address,
            ..DeviceInfo::default()
        },
    }
}

/// User-Agent 文字列から (ブラウザ, OS, デバイス種別) を推定
pub fn parse_user_agent(ua: &str) -> (Option<String>, Option<String>, Option<String>) {
    // 判定順に意味がある: Edge/Opera は UA に "Chrome" も含む
    let browser = if ua.contains("Edg/") {
        Some("Edge")
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        Some("Opera")
    } else if ua.contains("Chrome/") {
        Some("Chrome")
    } else if ua.contains("Firefox/") {
        Some("Firefox")
    } else if ua.contains("Safari/") {
        Some("Safari")
    } else {
        None
    };

    // iOS 判定は macOS より先（iPhone の UA は "like Mac OS X" を含む）
    let os = if ua.contains("iPhone") || ua.contains("iPad") {
        Some("iOS")
    } else if ua.contains("Android") {
        Some("Android")
    } else if ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        Some("macOS")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else {
        None
    };

    let device_type = if ua.contains("iPad") || ua.contains("Tablet") {
        Some("tablet")
    } else if ua.contains("Mobile") || ua.contains("iPhone") || ua.contains("Android") {
        Some("mobile")
    } else {
        Some("desktop")
    };

    (
        browser.map(str::to_string),
        os.map(str::to_string),
        device_type.map(str::to_string),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                              AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
                                 AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 \
                                 Mobile/15E148 Safari/604.1";
    const FIREFOX_WINDOWS: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 \
                                Safari/537.36 Edg/120.0.0.0";

    #[test]
    fn test_parse_chrome_on_mac() {
        let (browser, os, device_type) = parse_user_agent(CHROME_MAC);
        assert_eq!(browser.as_deref(), Some("Chrome"));
        assert_eq!(os.as_deref(), Some("macOS"));
        assert_eq!(device_type.as_deref(), Some("desktop"));
    }

    #[test]
    fn test_parse_safari_on_iphone() {
        let (browser, os, device_type) = parse_user_agent(SAFARI_IPHONE);
        assert_eq!(browser.as_deref(), Some("Safari"));
        assert_eq!(os.as_deref(), Some("iOS"));
        assert_eq!(device_type.as_deref(), Some("mobile"));
    }

    #[test]
    fn test_parse_firefox_on_windows() {
        let (browser, os, device_type) = parse_user_agent(FIREFOX_WINDOWS);
        assert_eq!(browser.as_deref(), Some("Firefox"));
        assert_eq!(os.as_deref(), Some("Windows"));
        assert_eq!(device_type.as_deref(), Some("desktop"));
    }

    #[test]
    fn test_edge_not_reported_as_chrome() {
        // Edge の UA は "Chrome" も含むため判定順を検証
        let (browser, _, _) = parse_user_agent(EDGE_WINDOWS);
        assert_eq!(browser.as_deref(), Some("Edge"));
    }

    #[test]
    fn test_unknown_user_agent() {
        let (browser, os, _) = parse_user_agent("curl/8.4.0");
        assert_eq!(browser, None);
        assert_eq!(os, None);
    }

    #[test]
    fn test_device_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::USER_AGENT, CHROME_MAC.parse().unwrap());
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());

        let info = device_info_from_headers(&headers);
        assert_eq!(info.browser.as_deref(), Some("Chrome"));
        // X-Forwarded-For の先頭のみ採用
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_device_info_without_user_agent() {
        let headers = HeaderMap::new();
        let info = device_info_from_headers(&headers);
        assert_eq!(info, DeviceInfo::default());
    }
}
