//! Human-readable rendering of core types.

use weathercast_core::{
    City, Phase, PersistedWidgetState, WeatherSnapshot, WeatherState, model::ForecastDay,
};

pub fn print_current(snapshot: &WeatherSnapshot) {
    let loc = &snapshot.location;
    let cur = &snapshot.current;

    println!("{}, {} ({})", loc.name, loc.country, loc.local_time);
    println!(
        "  {:.1}°C (feels like {:.1}°C), {}",
        cur.temp_c, cur.feels_like_c, cur.condition.text
    );
    println!(
        "  Humidity {}%  Wind {:.0} km/h {}  Pressure {:.0} mb  UV {:.0}",
        cur.humidity_pct, cur.wind_kph, cur.wind_dir, cur.pressure_mb, cur.uv
    );
}

pub fn print_day(day: &ForecastDay) {
    let s = &day.summary;
    println!(
        "  {}  {:>5.1}°C / {:>5.1}°C  {:<24} rain {:>3}%  humidity {:>3}%",
        day.date.format("%a %Y-%m-%d"),
        s.max_temp_c,
        s.min_temp_c,
        s.condition.text,
        s.rain_chance_pct,
        s.avg_humidity_pct
    );
}

pub fn print_hours(day: &ForecastDay) {
    for hour in day.hours.iter().step_by(3) {
        println!(
            "    {}  {:>5.1}°C  {:<24} rain {:>3}%",
            hour.time, hour.temp_c, hour.condition.text, hour.rain_chance_pct
        );
    }
}

pub fn print_forecast(snapshot: &WeatherSnapshot, selected: Option<usize>) {
    println!("Forecast:");
    for (i, day) in snapshot.forecast_days.iter().enumerate() {
        print_day(day);
        if selected == Some(i) {
            print_hours(day);
        }
    }
}

pub fn print_state(state: &WeatherState) {
    match state.phase {
        Phase::Idle => {
            println!("No city selected.");
            return;
        }
        Phase::Loading => println!("Loading..."),
        _ => {}
    }

    if let Some(error) = &state.error {
        println!("Error: {error}");
    }
    if let Some(current) = &state.current {
        print_current(current);
    }
    match (&state.forecast, state.phase) {
        (Some(forecast), _) => print_forecast(forecast, Some(state.selected_date_index)),
        (None, Phase::PartialReady) => println!("Forecast unavailable."),
        _ => {}
    }
}

pub fn print_cities(cities: &[City]) {
    if cities.is_empty() {
        println!("No matching places.");
        return;
    }
    for (i, city) in cities.iter().enumerate() {
        println!("{:>2}. {}  ({:.2}, {:.2})", i + 1, city.display_name(), city.lat, city.lon);
    }
}

pub fn print_widget(record: &PersistedWidgetState) {
    println!("{}", record.headline());
}
