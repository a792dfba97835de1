//! Trade page URL state: `?currency=<synth contract>&theme=<name>`.

use ethers::types::Address;
use std::str::FromStr;

use crate::chains::SupportedChain;
use crate::types::{Asset, Direction};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TradeRoute {
    pub currency: Option<Address>,
    pub theme: Option<String>,
}

impl TradeRoute {
    /// Unknown keys are ignored; an unparsable `currency` counts as absent.
    pub fn parse(url: &url::Url) -> Self {
        let mut route = TradeRoute::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "currency" => route.currency = Address::from_str(value.trim()).ok(),
                "theme" if !value.is_empty() => route.theme = Some(value.into_owned()),
                _ => {}
            }
        }
        route
    }

    pub fn apply(&self, base: &url::Url) -> url::Url {
        let mut url = base.clone();
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(currency) = self.currency {
                pairs.append_pair("currency", &ethers::utils::to_checksum(&currency, None));
            }
            if let Some(theme) = &self.theme {
                pairs.append_pair("theme", theme);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }

    /// Synth shown on the page: the routed one, else the chain default.
    pub fn synth(&self, chain: SupportedChain) -> Address {
        self.currency.unwrap_or_else(|| chain.default_synth())
    }

    /// Switching LONG/SHORT swaps the routed synth for its sibling.
    pub fn switch_direction(&self, asset: &Asset, direction: Direction) -> Self {
        if asset.direction == direction {
            return self.clone();
        }
        TradeRoute {
            currency: Some(asset.sibling),
            ..self.clone()
        }
    }

    pub fn spirit_theme(&self) -> bool {
        self.theme.as_deref() == Some("spirit")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::tests::asset;

    #[test]
    fn test_parse_and_apply() {
        let url = url::Url::parse(
            "https://app.test/trade?currency=0xC1664C5bE0dB8ABae249DCd23ec59E4D665656cB&theme=spirit&x=1",
        )
        .unwrap();
        let route = TradeRoute::parse(&url);
        assert_eq!(
            route.currency,
            Some(Address::from_str("0xC1664C5bE0dB8ABae249DCd23ec59E4D665656cB").unwrap())
        );
        assert!(route.spirit_theme());

        let rebuilt = route.apply(&url);
        assert_eq!(TradeRoute::parse(&rebuilt), route);
        assert!(!rebuilt.as_str().contains("x=1"));
    }

    #[test]
    fn test_fallback_to_default_synth() {
        let url = url::Url::parse("https://app.test/trade?currency=tesla").unwrap();
        let route = TradeRoute::parse(&url);
        assert_eq!(route.currency, None);
        assert_eq!(route.synth(SupportedChain::Xdai), SupportedChain::Xdai.default_synth());
        assert_eq!(route.apply(&url).as_str(), "https://app.test/trade");
    }

    #[test]
    fn test_switch_direction() {
        let a = asset("1", "0");
        let route = TradeRoute {
            currency: Some(a.contract),
            theme: None,
        };
        assert_eq!(route.switch_direction(&a, Direction::Long), route);
        assert_eq!(route.switch_direction(&a, Direction::Short).currency, Some(a.sibling));
    }
}
