//! # HTML Pages
//!
//! The two browser-facing pages the API serves: the PayU auto-submit form
//! and the redirect page after a PayU callback.

use buildfy_core::PaymentLink;

/// Escape text for HTML bodies and attribute values
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// A form that posts `link.form_fields` to `link.url` as soon as it loads
pub fn auto_submit_form(link: &PaymentLink) -> String {
    let inputs: String = link
        .form_fields
        .iter()
        .map(|(name, value)| {
            format!(
                r#"        <input type="hidden" name="{}" value="{}">"#,
                escape_html(name),
                escape_html(value)
            ) + "\n"
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Redirecting to payment</title></head>
<body onload="document.forms[0].submit()" style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0;">
    <form method="post" action="{action}">
{inputs}        <noscript><button type="submit">Continue to payment</button></noscript>
    </form>
    <p style="color: #666;">Redirecting to the payment page...</p>
</body>
</html>
"#,
        action = escape_html(&link.url),
        inputs = inputs,
    )
}

/// A page that sends the browser on to `target`
pub fn redirect_page(title: &str, target: &str) -> String {
    let target = escape_html(target);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{title}</title>
    <meta http-equiv="refresh" content="0;url={target}">
</head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0;">
    <p>{title}. <a href="{target}">Continue</a></p>
</body>
</html>
"#,
        title = escape_html(title),
        target = target,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_auto_submit_form() {
        let link = PaymentLink::form_post(
            "payu",
            "BFY1",
            "https://test.payu.in/_payment",
            vec![
                ("key".to_string(), "merchKEY".to_string()),
                ("firstname".to_string(), "<script>".to_string()),
            ],
        );
        let html = auto_submit_form(&link);

        assert!(html.contains(r#"action="https://test.payu.in/_payment""#));
        assert!(html.contains(r#"name="key" value="merchKEY""#));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("document.forms[0].submit()"));
    }

    #[test]
    fn test_redirect_page() {
        let html = redirect_page("Payment successful", "https://buildfy.app/payment/success?txnid=BFY1&status=success");
        assert!(html.contains("url=https://buildfy.app/payment/success?txnid=BFY1&amp;status=success"));
    }
}
