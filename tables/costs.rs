use serde::{Deserialize, Serialize};

use super::inflation;
use super::{StrokeType, TableError};
use crate::states::HealthState;

const ALIVE: usize = HealthState::COUNT - 1;

/// A per-state cost schedule for the living states, denominated in `year` dollars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCostRecord {
    pub year: u16,
    pub amounts: [f64; ALIVE],
}

/// A single cost item denominated in `year` dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub year: u16,
    pub amount: f64,
}

impl CostRecord {
    fn inflate(self, target_year: u16) -> Result<f64, TableError> {
        inflation::convert(self.year, target_year, self.amount)
    }
}

impl StateCostRecord {
    fn inflate(&self, target_year: u16) -> Result<[f64; ALIVE], TableError> {
        let mut out = [0.0; ALIVE];
        for (slot, &amount) in out.iter_mut().zip(self.amounts.iter()) {
            *slot = inflation::convert(self.year, target_year, amount)?;
        }
        Ok(out)
    }
}

/// Unit costs as published, each in its own source-year currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCosts {
    /// First 90 days after an ischemic stroke (Dewilde 2014).
    pub ninety_day_ischemic: StateCostRecord,
    /// First 90 days after an intracerebral hemorrhage (Christensen 2008).
    pub ninety_day_hemorrhagic: StateCostRecord,
    /// Annual cost of living in each state (Dewilde 2014).
    pub annual: StateCostRecord,
    /// Cost of a stroke death (Christensen 2008).
    pub death: CostRecord,
    /// Intravenous thrombolysis (Sevick 2014).
    pub thrombolysis: CostRecord,
    /// Endovascular thrombectomy (Kleindorfer 2014).
    pub thrombectomy: CostRecord,
    /// Inter-hospital transfer (Mohr 2010).
    pub transfer: CostRecord,
}

impl Default for RawCosts {
    fn default() -> Self {
        Self {
            ninety_day_ischemic: StateCostRecord {
                year: 2014,
                amounts: [0.0, 6302.0, 9448.0, 14918.0, 26218.0, 32502.0, 26071.0],
            },
            ninety_day_hemorrhagic: StateCostRecord {
                year: 2008,
                amounts: [0.0, 9500.0, 15500.0, 18700.0, 27400.0, 27300.0, 27300.0],
            },
            annual: StateCostRecord {
                year: 2014,
                amounts: [0.0, 2921.0, 3905.0, 6501.0, 16922.0, 42335.0, 39723.0],
            },
            death: CostRecord {
                year: 2008,
                amount: 8100.0,
            },
            thrombolysis: CostRecord {
                year: 2014,
                amount: 13419.0,
            },
            thrombectomy: CostRecord {
                year: 2014,
                amount: 6400.0,
            },
            transfer: CostRecord {
                year: 2010,
                amount: 763.0,
            },
        }
    }
}

/// Unit costs expressed in a single currency year.
///
/// The only constructor performs the inflation pass, so a table can never be inflated twice
/// and every table a caller holds is already in its final currency.
#[derive(Debug, Clone, PartialEq)]
pub struct CostTable {
    currency_year: u16,
    ninety_day_ischemic: [f64; ALIVE],
    ninety_day_hemorrhagic: [f64; ALIVE],
    annual: [f64; ALIVE],
    death: f64,
    thrombolysis: f64,
    thrombectomy: f64,
    transfer: f64,
}

impl CostTable {
    pub fn new(raw: &RawCosts, currency_year: u16) -> Result<Self, TableError> {
        log::debug!("Inflating unit costs to {currency_year} dollars");
        Ok(Self {
            currency_year,
            ninety_day_ischemic: raw.ninety_day_ischemic.inflate(currency_year)?,
            ninety_day_hemorrhagic: raw.ninety_day_hemorrhagic.inflate(currency_year)?,
            annual: raw.annual.inflate(currency_year)?,
            death: raw.death.inflate(currency_year)?,
            thrombolysis: raw.thrombolysis.inflate(currency_year)?,
            thrombectomy: raw.thrombectomy.inflate(currency_year)?,
            transfer: raw.transfer.inflate(currency_year)?,
        })
    }

    pub fn currency_year(&self) -> u16 {
        self.currency_year
    }

    /// Cost of one year spent in `state`. Death carries the one-off death cost.
    pub fn annual(&self, state: HealthState) -> f64 {
        match state {
            HealthState::Death => self.death,
            alive => self.annual[alive.ordinal()],
        }
    }

    /// Cost of the first 90 days after a stroke of `kind`, ending in `state`.
    pub fn ninety_day(&self, kind: StrokeType, state: HealthState) -> f64 {
        match (kind, state) {
            (_, HealthState::Death) => self.death,
            (StrokeType::Ischemic, alive) => self.ninety_day_ischemic[alive.ordinal()],
            (StrokeType::Hemorrhagic, alive) => self.ninety_day_hemorrhagic[alive.ordinal()],
        }
    }

    pub fn death(&self) -> f64 {
        self.death
    }

    pub fn thrombolysis(&self) -> f64 {
        self.thrombolysis
    }

    pub fn thrombectomy(&self) -> f64 {
        self.thrombectomy
    }

    pub fn transfer(&self) -> f64 {
        self.transfer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn source_year_table_is_unchanged() {
        let raw = RawCosts::default();
        let table = CostTable::new(&raw, 2008).unwrap();
        assert_relative_eq!(table.death(), 8100.0);
        assert_relative_eq!(
            table.ninety_day(StrokeType::Hemorrhagic, HealthState::ModifiedRankin2),
            18700.0
        );
    }

    #[test]
    fn inflation_uses_each_record_source_year() {
        let raw = RawCosts::default();
        let table = CostTable::new(&raw, 2016).unwrap();
        assert_eq!(table.currency_year(), 2016);
        assert_relative_eq!(
            table.annual(HealthState::ModifiedRankin4),
            42335.0 * 240.007 / 236.736,
            epsilon = 1e-6
        );
        assert_relative_eq!(table.death(), 8100.0 * 240.007 / 215.303, epsilon = 1e-6);
        assert_relative_eq!(table.transfer(), 763.0 * 240.007 / 218.056, epsilon = 1e-6);
    }

    #[test]
    fn death_state_maps_to_death_cost() {
        let table = CostTable::new(&RawCosts::default(), 2014).unwrap();
        assert_eq!(table.annual(HealthState::Death), table.death());
        assert_eq!(
            table.ninety_day(StrokeType::Ischemic, HealthState::Death),
            table.death()
        );
        assert_eq!(table.annual(HealthState::GeneralPopulation), 0.0);
    }

    #[test]
    fn unknown_currency_year_is_rejected() {
        assert!(CostTable::new(&RawCosts::default(), 2040).is_err());
    }
}
