use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::model::*;

use super::error::EngineError;

/// Time-of-day price for one court. `days = None` applies every day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBracket {
    pub start: NaiveTime,
    /// `00:00:00` runs to midnight.
    pub end: NaiveTime,
    pub per_hour: Cents,
    #[serde(default)]
    pub days: Option<Vec<Weekday>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub on: Recurrence,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub per_hour: Cents,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub brackets: Vec<RateBracket>,
    #[serde(default)]
    pub promotions: Vec<Promotion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub per_hour: Cents,
    pub is_promo: bool,
}

/// Flat fees charged once per booking for each enabled add-on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonFees {
    #[serde(default)]
    pub lighting: Cents,
    #[serde(default)]
    pub heating: Cents,
}

impl AddonFees {
    pub fn fee(&self, addon: Addon) -> Cents {
        match addon {
            Addon::Lighting => self.lighting,
            Addon::Heating => self.heating,
        }
    }
}

fn time_in(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if end.num_seconds_from_midnight() == 0 {
        t >= start
    } else {
        start <= t && t < end
    }
}

impl RateTable {
    /// Rate in force at instant `at`. An active promotion wins over any bracket;
    /// among brackets the first listed match wins.
    pub fn rate_at(&self, at: NaiveDateTime) -> Option<Rate> {
        let (date, time) = (at.date(), at.time());

        let promo = self
            .promotions
            .iter()
            .find(|p| p.on.applies_to(date) && time_in(time, p.start, p.end));
        if let Some(p) = promo {
            return Some(Rate {
                per_hour: p.per_hour,
                is_promo: true,
            });
        }

        self.brackets
            .iter()
            .find(|b| {
                b.days.as_ref().is_none_or(|d| d.contains(&date.weekday()))
                    && time_in(time, b.start, b.end)
            })
            .map(|b| Rate {
                per_hour: b.per_hour,
                is_promo: false,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonCharge {
    pub addon: Addon,
    pub fee: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub court_id: CourtId,
    pub span: Span,
    pub rate: Rate,
    pub base: Cents,
    pub addons: Vec<AddonCharge>,
    pub total: Cents,
    pub max_players: u32,
}

impl Quote {
    pub fn is_promo(&self) -> bool {
        self.rate.is_promo
    }

    /// Each player's share, rounded half-up to the cent.
    pub fn per_participant(&self) -> Cents {
        let players = Cents::from(self.max_players.max(1));
        (self.total + players / 2) / players
    }
}

/// `per_hour × minutes / 60`, rounded half-up.
pub fn prorate(per_hour: Cents, minutes: Minutes) -> Cents {
    (per_hour * minutes + 30) / 60
}

/// Price `candidate` from the rate in force at its start. The whole booking
/// uses that one rate even when it runs into a later bracket.
pub fn quote(court: &Court, candidate: &Candidate, rate: Rate, fees: &AddonFees) -> Result<Quote, EngineError> {
    if let Some(addon) = court.first_unsupported(&candidate.addons) {
        return Err(EngineError::Unsupported(addon));
    }

    let span = candidate.span();
    let base = prorate(rate.per_hour, span.minutes());
    let addons: Vec<AddonCharge> = candidate
        .addons
        .enabled()
        .map(|addon| AddonCharge {
            addon,
            fee: fees.fee(addon),
        })
        .collect();
    let total = base + addons.iter().map(|a| a.fee).sum::<Cents>();

    Ok(Quote {
        court_id: court.id,
        span,
        rate,
        base,
        addons,
        total,
        max_players: court.max_players,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use ulid::Ulid;

    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        monday().and_time(hm(h, m))
    }

    fn table() -> RateTable {
        RateTable {
            brackets: vec![
                RateBracket {
                    start: hm(8, 0),
                    end: hm(17, 0),
                    per_hour: 2000,
                    days: None,
                },
                RateBracket {
                    start: hm(17, 0),
                    end: hm(23, 0),
                    per_hour: 2800,
                    days: None,
                },
            ],
            promotions: vec![],
        }
    }

    fn court(lighting: bool) -> Court {
        Court {
            id: Ulid::new(),
            name: "Pista 2".into(),
            windows: vec![],
            closures: vec![],
            max_players: 4,
            has_lighting: lighting,
            has_heating: false,
            features: vec![],
        }
    }

    #[test]
    fn bracket_lookup_is_half_open() {
        let t = table();
        assert_eq!(t.rate_at(at(16, 59)).map(|r| r.per_hour), Some(2000));
        assert_eq!(t.rate_at(at(17, 0)).map(|r| r.per_hour), Some(2800));
        assert_eq!(t.rate_at(at(23, 0)), None);
        assert_eq!(t.rate_at(at(7, 30)), None);
    }

    #[test]
    fn start_bracket_prices_whole_booking() {
        let c = court(true);
        let candidate = Candidate::new(c.id, at(16, 30), 90);
        let rate = table().rate_at(candidate.start).unwrap();
        let q = quote(&c, &candidate, rate, &AddonFees::default()).unwrap();
        assert_eq!(q.base, 3000);
        assert_eq!(q.total, 3000);
        assert!(!q.is_promo());

        let lit = candidate.with_addons(Addons {
            lighting: true,
            heating: false,
        });
        let fees = AddonFees {
            lighting: 400,
            heating: 600,
        };
        let q = quote(&c, &lit, rate, &fees).unwrap();
        assert_eq!(q.total, 3400);
        assert_eq!(q.per_participant(), 850);
    }

    #[test]
    fn unsupported_addon_refused() {
        let c = court(false);
        let candidate = Candidate::new(c.id, at(10, 0), 60).with_addons(Addons {
            lighting: true,
            heating: false,
        });
        let rate = Rate {
            per_hour: 2000,
            is_promo: false,
        };
        let err = quote(&c, &candidate, rate, &AddonFees::default()).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(Addon::Lighting)));
    }

    #[test]
    fn promotion_overrides_bracket() {
        let mut t = table();
        t.promotions.push(Promotion {
            on: Recurrence::Dated(monday()),
            start: hm(8, 0),
            end: hm(12, 0),
            per_hour: 1500,
        });
        let rate = t.rate_at(at(9, 0)).unwrap();
        assert_eq!(rate, Rate { per_hour: 1500, is_promo: true });
        assert!(!t.rate_at(at(12, 0)).unwrap().is_promo);
        let tuesday = at(9, 0) + chrono::TimeDelta::days(1);
        assert!(!t.rate_at(tuesday).unwrap().is_promo);
    }

    #[test]
    fn weekday_restricted_bracket_and_midnight_end() {
        let t = RateTable {
            brackets: vec![
                RateBracket {
                    start: hm(18, 0),
                    end: hm(0, 0),
                    per_hour: 3200,
                    days: Some(vec![Weekday::Sat, Weekday::Sun]),
                },
                RateBracket {
                    start: hm(18, 0),
                    end: hm(0, 0),
                    per_hour: 2800,
                    days: None,
                },
            ],
            promotions: vec![],
        };
        assert_eq!(t.rate_at(at(23, 30)).unwrap().per_hour, 2800);
        let saturday = monday() + chrono::TimeDelta::days(5);
        assert_eq!(t.rate_at(saturday.and_time(hm(19, 0))).unwrap().per_hour, 3200);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(prorate(2000, 45), 1500);
        assert_eq!(prorate(1999, 30), 1000); // 999.5
        assert_eq!(prorate(1001, 30), 501); // 500.5
        let q = Quote {
            court_id: Ulid::nil(),
            span: Span::new(at(9, 0), at(10, 0)),
            rate: Rate {
                per_hour: 1002,
                is_promo: false,
            },
            base: 1002,
            addons: vec![],
            total: 1002,
            max_players: 4,
        };
        assert_eq!(q.per_participant(), 251); // 250.5
    }
}
