use hyper::HeaderMap;
use std::net::IpAddr;

/// Client address reported by the first of `header_names` present in the request.
///
/// With `leftmost` the first value of a comma-separated list is taken (the original client for
/// X-Forwarded-For), otherwise the last one (the closest proxy).
pub fn forwarded_ip(
    headers: &HeaderMap,
    header_names: &[String],
    leftmost: bool,
) -> Option<IpAddr> {
    let value = header_names.iter().find_map(|name| {
        let values = headers.get_all(name);
        let mut values = values.iter();
        if leftmost {
            values.next()
        } else {
            values.next_back()
        }
    })?;
    let mut hops = value.to_str().ok()?.split(',').map(str::trim);
    let hop = if leftmost {
        hops.next()
    } else {
        hops.next_back()
    }?;
    hop.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const XFF: &str = "X-FORWARDED-FOR";

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, value.parse().unwrap());
        }
        headers
    }

    #[test]
    fn no_headers() {
        for leftmost in [false, true] {
            assert_eq!(
                forwarded_ip(&HeaderMap::new(), &[XFF.to_owned()], leftmost),
                None
            );
            assert_eq!(forwarded_ip(&headers(&[(XFF, "1.2.3.4")]), &[], leftmost), None);
        }
    }

    #[test]
    fn single_value() {
        let ip = IpAddr::V4(Ipv4Addr::new(128, 174, 199, 60));
        for leftmost in [false, true] {
            let request_headers = headers(&[(XFF, "128.174.199.60")]);
            let actual = forwarded_ip(&request_headers, &[XFF.to_owned()], leftmost);
            assert_eq!(actual, Some(ip));
        }
    }

    #[test]
    fn list_of_hops() {
        let request_headers = headers(&[(XFF, "128.174.199.60, 80.94.184.70 ,2001:db8::1")]);
        assert_eq!(
            forwarded_ip(&request_headers, &[XFF.to_owned()], true),
            Some("128.174.199.60".parse().unwrap())
        );
        assert_eq!(
            forwarded_ip(&request_headers, &[XFF.to_owned()], false),
            Some("2001:db8::1".parse().unwrap())
        );
    }

    #[test]
    fn repeated_header() {
        let request_headers = headers(&[(XFF, "10.0.0.1"), (XFF, "10.0.0.2")]);
        assert_eq!(
            forwarded_ip(&request_headers, &[XFF.to_owned()], true),
            Some("10.0.0.1".parse().unwrap())
        );
        assert_eq!(
            forwarded_ip(&request_headers, &[XFF.to_owned()], false),
            Some("10.0.0.2".parse().unwrap())
        );
    }

    #[test]
    fn header_order_follows_names() {
        let request_headers = headers(&[("X-REAL-IP", "10.0.0.1"), (XFF, "10.0.0.2")]);
        let names = ["X-REAL-IP".to_owned(), XFF.to_owned()];
        assert_eq!(
            forwarded_ip(&request_headers, &names, true),
            Some("10.0.0.1".parse().unwrap())
        );
        let names = ["X-CLIENT-IP".to_owned(), XFF.to_owned()];
        assert_eq!(
            forwarded_ip(&request_headers, &names, true),
            Some("10.0.0.2".parse().unwrap())
        );
    }

    #[test]
    fn garbage() {
        let request_headers = headers(&[(XFF, "unknown, 10.0.0.2")]);
        assert_eq!(forwarded_ip(&request_headers, &[XFF.to_owned()], true), None);
    }
}
