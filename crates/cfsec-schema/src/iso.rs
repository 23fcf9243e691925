//! ISO reference data.

use cfsec_kernel::define_entity;

define_entity! {
    /// ISO 4217 currency.
    pub struct IsoCcy("ISOCcy") {
        keys {}
        scalars {
            iso_code: Text(3) ["requiredISOCode"] => set_iso_code;
            name: Text(64) ["requiredName"] => set_name;
            unit_symbol: OptText(4) ["optionalUnitSymbol"] => set_unit_symbol;
            precis: SmallInt(0, 10) ["requiredPrecis"] => set_precis;
        }
        indexes {
            unique "CcyCdIdx" => ["iso_code"];
            unique "CcyNmIdx" => ["name"];
        }
    }
}

define_entity! {
    /// ISO 3166 country.
    pub struct IsoCtry("ISOCtry") {
        keys {}
        scalars {
            iso_code: Text(2) ["requiredISOCode"] => set_iso_code;
            name: Text(64) ["requiredName"] => set_name;
        }
        indexes {
            unique "IsoCdIdx" => ["iso_code"];
            unique "NameIdx" => ["name"];
        }
    }
}

define_entity! {
    /// ISO 639 language.
    pub struct IsoLang("ISOLang") {
        keys {}
        scalars {
            iso6392_code: Text(3) ["requiredISO6392Code"] => set_iso6392_code;
            iso6391_code: OptText(2) ["optionalISO6391Code"] => set_iso6391_code;
            english_name: Text(64) ["requiredEnglishName"] => set_english_name;
        }
        indexes {
            unique "Code3Idx" => ["iso6392_code"];
            index "Code2Idx" => ["iso6391_code"];
        }
    }
}

define_entity! {
    /// ISO 8601 time zone offset with a display name.
    pub struct IsoTZone("ISOTZone") {
        keys {}
        scalars {
            iso8601: Text(6) ["requiredIso8601"] => set_iso8601;
            tz_name: Text(64) ["requiredTZName"] => set_tz_name;
            tz_hour_offset: SmallInt(-12, 14) ["requiredTZHourOffset"] => set_tz_hour_offset;
            tz_min_offset: SmallInt(-59, 59) ["requiredTZMinOffset"] => set_tz_min_offset;
            description: Text(128) ["requiredDescription"] => set_description;
            visible: Boolean() ["requiredVisible"] => set_visible;
        }
        indexes {
            index "OffsetIdx" => ["tz_hour_offset", "tz_min_offset"];
            unique "UTZNameIdx" => ["tz_name"];
            index "Iso8601Idx" => ["iso8601"];
        }
    }
}
