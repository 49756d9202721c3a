//! Gateway return classification

use url::Url;

/// Path segment the cancel url of a top-up is routed through
const CANCEL_PATH_SEGMENT: &str = "payment-cancelled";

/// Outcome of classifying a navigation as a gateway return
///
/// Pure classification, no side effects. Cancellation takes priority over
/// success parameters; a navigation carrying neither is not a gateway return
/// at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayReturn {
    /// The navigation is not a gateway return
    None,
    /// The gateway approved the payment
    Success {
        /// Gateway payment id
        payment_id: String,
        /// Payer id assigned by the gateway
        payer_id: String,
    },
    /// The user backed out at the gateway
    Cancelled,
}

impl GatewayReturn {
    /// Classify the current navigation's url
    pub fn from_url(url: &Url) -> Self {
        let mut payment_id = None;
        let mut payer_id = None;
        let mut cancelled = false;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "paymentId" => payment_id = Some(value.into_owned()),
                "PayerID" => payer_id = Some(value.into_owned()),
                "cancel" => cancelled = value == "true",
                _ => {}
            }
        }

        let cancel_path = url
            .path_segments()
            .map(|mut segments| segments.any(|segment| segment == CANCEL_PATH_SEGMENT))
            .unwrap_or(false);

        if cancelled || cancel_path {
            return Self::Cancelled;
        }

        match (payment_id, payer_id) {
            (Some(payment_id), Some(payer_id)) => Self::Success {
                payment_id,
                payer_id,
            },
            _ => Self::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> GatewayReturn {
        GatewayReturn::from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_success_requires_both_params() {
        assert_eq!(
            parse("https://app.kitloan.io/wallet?paymentId=PAY-1&PayerID=A1"),
            GatewayReturn::Success {
                payment_id: "PAY-1".to_string(),
                payer_id: "A1".to_string(),
            }
        );

        assert_eq!(
            parse("https://app.kitloan.io/wallet?paymentId=PAY-1"),
            GatewayReturn::None
        );
        assert_eq!(
            parse("https://app.kitloan.io/wallet?PayerID=A1"),
            GatewayReturn::None
        );
    }

    #[test]
    fn test_cancel_flag() {
        assert_eq!(
            parse("https://app.kitloan.io/wallet?cancel=true"),
            GatewayReturn::Cancelled
        );
        // anything but the explicit flag value is not a cancel
        assert_eq!(
            parse("https://app.kitloan.io/wallet?cancel=maybe"),
            GatewayReturn::None
        );
    }

    #[test]
    fn test_cancel_path_marker() {
        assert_eq!(
            parse("https://app.kitloan.io/wallet/payment-cancelled"),
            GatewayReturn::Cancelled
        );
    }

    #[test]
    fn test_cancel_takes_priority_over_success() {
        assert_eq!(
            parse("https://app.kitloan.io/wallet/payment-cancelled?paymentId=PAY-1&PayerID=A1"),
            GatewayReturn::Cancelled
        );
        assert_eq!(
            parse("https://app.kitloan.io/wallet?paymentId=PAY-1&PayerID=A1&cancel=true"),
            GatewayReturn::Cancelled
        );
    }

    #[test]
    fn test_plain_navigation_is_no_op() {
        assert_eq!(parse("https://app.kitloan.io/wallet"), GatewayReturn::None);
    }
}
