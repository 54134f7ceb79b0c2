use rustc_hash::FxHashMap;
use std::sync::Arc;

/// One entry in the closed, compiled-in service catalog.
pub struct ServiceDef {
    pub name: &'static str,
    /// Adblock rules of the bundle; all are `||host^` domain rules.
    pub rules: &'static [&'static str],
}

/// Well-known services that can be blocked as a unit. The set is baked into
/// the binary; the control plane can only toggle membership, never edit it.
pub static SERVICES: &[ServiceDef] = &[
    ServiceDef { name: "9gag", rules: &["||9gag.com^"] },
    ServiceDef { name: "amazon", rules: &["||amazon.com^", "||amazon.co.uk^", "||amazon.de^", "||media-amazon.com^", "||primevideo.com^"] },
    ServiceDef { name: "cloudflare", rules: &["||cloudflare.com^", "||cloudflare-dns.com^", "||workers.dev^", "||pages.dev^"] },
    ServiceDef { name: "dailymotion", rules: &["||dailymotion.com^", "||dm-event.net^"] },
    ServiceDef { name: "discord", rules: &["||discord.com^", "||discord.gg^", "||discordapp.com^", "||discordapp.net^"] },
    ServiceDef { name: "disneyplus", rules: &["||disneyplus.com^", "||disney-plus.net^", "||dssott.com^"] },
    ServiceDef { name: "ebay", rules: &["||ebay.com^", "||ebaystatic.com^", "||ebayimg.com^"] },
    ServiceDef { name: "epic_games", rules: &["||epicgames.com^", "||unrealengine.com^"] },
    ServiceDef { name: "facebook", rules: &["||facebook.com^", "||facebook.net^", "||fbcdn.net^", "||fb.com^", "||fb.gg^", "||messenger.com^"] },
    ServiceDef { name: "hulu", rules: &["||hulu.com^", "||hulustream.com^"] },
    ServiceDef { name: "instagram", rules: &["||instagram.com^", "||cdninstagram.com^"] },
    ServiceDef { name: "mail_ru", rules: &["||mail.ru^"] },
    ServiceDef { name: "minecraft", rules: &["||minecraft.net^", "||mojang.com^"] },
    ServiceDef { name: "netflix", rules: &["||netflix.com^", "||nflxvideo.net^", "||nflximg.net^", "||nflxext.com^"] },
    ServiceDef { name: "ok", rules: &["||ok.ru^"] },
    ServiceDef { name: "origin", rules: &["||origin.com^", "||ea.com^"] },
    ServiceDef { name: "pinterest", rules: &["||pinterest.com^", "||pinimg.com^"] },
    ServiceDef { name: "qq", rules: &["||qq.com^"] },
    ServiceDef { name: "reddit", rules: &["||reddit.com^", "||redditmedia.com^", "||redditstatic.com^", "||redd.it^"] },
    ServiceDef { name: "roblox", rules: &["||roblox.com^", "||rbxcdn.com^"] },
    ServiceDef { name: "skype", rules: &["||skype.com^", "||skypeassets.com^"] },
    ServiceDef { name: "snapchat", rules: &["||snapchat.com^", "||sc-cdn.net^", "||snap-dev.net^"] },
    ServiceDef { name: "spotify", rules: &["||spotify.com^", "||scdn.co^", "||spotifycdn.com^"] },
    ServiceDef { name: "steam", rules: &["||steampowered.com^", "||steamcommunity.com^", "||steamstatic.com^"] },
    ServiceDef { name: "telegram", rules: &["||telegram.org^", "||t.me^", "||telegram.me^"] },
    ServiceDef { name: "tiktok", rules: &["||tiktok.com^", "||tiktokcdn.com^", "||musical.ly^", "||tiktokv.com^"] },
    ServiceDef { name: "tinder", rules: &["||tinder.com^", "||gotinder.com^"] },
    ServiceDef { name: "twitch", rules: &["||twitch.tv^", "||ttvnw.net^", "||jtvnw.net^", "||twitchcdn.net^"] },
    ServiceDef { name: "twitter", rules: &["||twitter.com^", "||twimg.com^", "||t.co^", "||x.com^"] },
    ServiceDef { name: "viber", rules: &["||viber.com^"] },
    ServiceDef { name: "vimeo", rules: &["||vimeo.com^", "||vimeocdn.com^"] },
    ServiceDef { name: "vk", rules: &["||vk.com^", "||userapi.com^", "||vk-cdn.net^"] },
    ServiceDef { name: "wargaming", rules: &["||wargaming.net^", "||worldoftanks.com^"] },
    ServiceDef { name: "wechat", rules: &["||wechat.com^", "||weixin.qq.com^"] },
    ServiceDef { name: "whatsapp", rules: &["||whatsapp.com^", "||whatsapp.net^", "||wa.me^"] },
    ServiceDef { name: "youtube", rules: &["||youtube.com^", "||ytimg.com^", "||googlevideo.com^", "||youtu.be^", "||youtube-nocookie.com^"] },
];

pub fn service_exists(name: &str) -> bool {
    SERVICES.iter().any(|s| s.name == name)
}

pub fn service_names() -> Vec<&'static str> {
    SERVICES.iter().map(|s| s.name).collect()
}

/// Service rules pre-indexed by anchor host for the hot path.
pub struct ServiceCatalog {
    /// host → (service name, rule text)
    by_host: FxHashMap<&'static str, (&'static str, &'static str)>,
}

impl ServiceCatalog {
    pub fn build() -> Self {
        let mut by_host = FxHashMap::default();
        for service in SERVICES {
            for rule in service.rules {
                let host = rule
                    .trim_start_matches("||")
                    .trim_end_matches('^');
                by_host.insert(host, (service.name, *rule));
            }
        }
        Self { by_host }
    }

    /// Which blocked service, if any, covers `name`.
    pub fn match_name(
        &self,
        name: &str,
        blocked: &[Arc<str>],
    ) -> Option<(&'static str, &'static str)> {
        if blocked.is_empty() {
            return None;
        }
        let mut suffix = name;
        loop {
            if let Some(&(service, rule)) = self.by_host.get(suffix) {
                if blocked.iter().any(|b| b.as_ref() == service) {
                    return Some((service, rule));
                }
            }
            match suffix.find('.') {
                Some(i) => suffix = &suffix[i + 1..],
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_closed_and_sorted_unique() {
        let names = service_names();
        let mut dedup = names.clone();
        dedup.dedup();
        assert_eq!(names.len(), dedup.len());
        assert!(service_exists("facebook"));
        assert!(!service_exists("not-a-service"));
    }

    #[test]
    fn test_match_blocked_service_subdomain() {
        let catalog = ServiceCatalog::build();
        let blocked: Vec<Arc<str>> = vec![Arc::from("facebook")];
        let hit = catalog.match_name("www.facebook.com", &blocked);
        assert_eq!(hit.map(|(s, _)| s), Some("facebook"));
    }

    #[test]
    fn test_unblocked_service_passes() {
        let catalog = ServiceCatalog::build();
        let blocked: Vec<Arc<str>> = vec![Arc::from("youtube")];
        assert!(catalog.match_name("www.facebook.com", &blocked).is_none());
    }

    #[test]
    fn test_empty_blocked_set_short_circuits() {
        let catalog = ServiceCatalog::build();
        assert!(catalog.match_name("www.facebook.com", &[]).is_none());
    }
}
