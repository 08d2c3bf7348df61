//! Credential rotation and cookie capture for a [`PaginationContext`].
//!
//! Both work on the context value passed in; nothing here keeps state of
//! its own.

use company_etl_ingest_models::PaginationContext;

/// Returns the credential index to use after `previous`.
///
/// Starts at 0 and wraps around after `len - 1`. Returns `None` when there
/// are no credentials to rotate.
#[must_use]
pub fn next_credential(previous: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(previous.map_or(0, |i| (i + 1) % len))
}

/// Stores the `name=value` pair of every `Set-Cookie` header value in the
/// context, replacing earlier values of the same name.
pub fn absorb_set_cookies<'a>(
    context: &mut PaginationContext,
    set_cookie_values: impl IntoIterator<Item = &'a str>,
) {
    for header in set_cookie_values {
        let pair = header.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        context
            .cookies
            .insert(name.to_string(), value.trim().to_string());
    }
}

/// Formats the captured cookies as a `Cookie` header value.
#[must_use]
pub fn cookie_header(context: &PaginationContext) -> String {
    context
        .cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_round_robin() {
        assert_eq!(next_credential(None, 3), Some(0));
        assert_eq!(next_credential(Some(0), 3), Some(1));
        assert_eq!(next_credential(Some(2), 3), Some(0));
        assert_eq!(next_credential(Some(7), 3), Some(2));
        assert_eq!(next_credential(Some(1), 0), None);
    }

    #[test]
    fn captures_cookie_pairs() {
        let mut context = PaginationContext::default();
        absorb_set_cookies(
            &mut context,
            [
                "AWSALB=abc123; Expires=Tue, 01 Jan 2030 00:00:00 GMT; Path=/",
                "session= xyz ; HttpOnly",
                "garbage",
                "=novalue",
            ],
        );

        assert_eq!(context.cookies.len(), 2);
        assert_eq!(context.cookies["AWSALB"], "abc123");
        assert_eq!(context.cookies["session"], "xyz");
        assert_eq!(cookie_header(&context), "AWSALB=abc123; session=xyz");
    }

    #[test]
    fn later_cookies_replace_earlier_ones() {
        let mut context = PaginationContext::default();
        absorb_set_cookies(&mut context, ["a=1"]);
        absorb_set_cookies(&mut context, ["a=2"]);
        assert_eq!(cookie_header(&context), "a=2");
    }
}
