use std::borrow::Cow;

use url::Url;

use crate::message::model::Listing;

const DEFAULT_CURRENCY: &str = "USD";

/// Product handed over by a link into the thread, e.g.
/// `?listing_id=42&name=Desk&price=120&currency=EUR`.
#[derive(Clone, Debug, PartialEq)]
pub struct DeepLink {
    listing: Listing,
}

impl DeepLink {
    pub fn from_url(url: &Url) -> Option<Self> {
        Self::from_query(url.query_pairs())
    }

    /// `listing_id` and `name` are required; everything else is optional.
    pub fn from_query<'a>(pairs: impl IntoIterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Option<Self> {
        let mut id = None;
        let mut name = None;
        let mut image = None;
        let mut price = 0.0;
        let mut currency = None;
        let mut url = None;
        let mut unit = None;
        let mut kind = None;

        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match &*key {
                "listing_id" => id = Some(value.to_owned()),
                "name" => name = Some(value.to_owned()),
                "image" => image = Url::parse(value).ok(),
                "price" => price = value.parse().unwrap_or(0.0),
                "currency" => currency = Some(value.to_uppercase()),
                "url" => url = Url::parse(value).ok(),
                "unit" => unit = Some(value.to_owned()),
                "type" => kind = Some(value.to_owned()),
                _ => {}
            }
        }

        Some(Self {
            listing: Listing {
                id: id?,
                name: name?,
                image,
                price,
                currency: currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_owned()),
                url,
                unit,
                kind,
            },
        })
    }

    pub const fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn into_listing(self) -> Listing {
        self.listing
    }
}
